//! Replay Command
//!
//! Feeds a recorded domain event stream (one JSON object per line) through a
//! fresh Stage and Notifier and writes the native notifications it produces.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use stagehand_core::aggregate::{RunSummary, SceneRecord, TestStatus};
use stagehand_core::model::OutcomeKind;
use stagehand_core::{DomainEvent, JsonLinesReporter, Notifier, Stage, StagehandConfig, SystemClock};

use crate::output::{
    print_success, print_warning, render_item, render_list, OutputFormat, TableDisplay,
};

/// Exit code when every scene passed
pub const EXIT_PASSED: i32 = 0;
/// Exit code when at least one scene failed
pub const EXIT_FAILED: i32 = 1;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Event stream to replay, `-` for stdin
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Write native notifications to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker/capability id stamped on every payload
    #[arg(long)]
    pub cid: Option<String>,

    /// Spec file reported in payloads (repeatable)
    #[arg(long = "spec")]
    pub specs: Vec<String>,

    /// Most severe outcome still counted as a success
    #[arg(long, value_parser = parse_outcome_kind)]
    pub success_threshold: Option<OutcomeKind>,

    /// How long to wait for outstanding async operations
    #[arg(long)]
    pub cue_timeout_ms: Option<u64>,
}

fn parse_outcome_kind(value: &str) -> std::result::Result<OutcomeKind, String> {
    value.parse()
}

impl ReplayArgs {
    /// Command-line flags override the configuration file
    pub fn apply_to(&self, config: &mut StagehandConfig) {
        if let Some(cid) = &self.cid {
            config.notifier.cid = cid.clone();
        }
        if !self.specs.is_empty() {
            config.notifier.specs = self.specs.clone();
        }
        if let Some(threshold) = self.success_threshold {
            config.notifier.success_threshold = threshold;
        }
        if let Some(timeout) = self.cue_timeout_ms {
            config.stage.cue_timeout_ms = timeout;
        }
    }
}

/// Scene display wrapper for serialization
#[derive(Serialize)]
pub struct SceneDisplay {
    pub scene: String,
    pub status: TestStatus,
    pub outcome: String,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl From<&SceneRecord> for SceneDisplay {
    fn from(record: &SceneRecord) -> Self {
        Self {
            scene: record.full_title.clone(),
            status: record.status(),
            outcome: record.outcome.to_string(),
            attempts: record.attempts,
            duration_ms: record.duration.as_millis() as u64,
        }
    }
}

impl TableDisplay for SceneDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["SCENE", "STATUS", "ATTEMPTS", "DURATION"]
    }

    fn row(&self) -> Vec<String> {
        let status = match self.status {
            TestStatus::Passed => self.status.as_str().green().to_string(),
            TestStatus::Failed => self.status.as_str().red().to_string(),
            TestStatus::Pending => self.status.as_str().yellow().to_string(),
            TestStatus::Skipped => self.status.as_str().dimmed().to_string(),
        };
        vec![
            self.scene.clone(),
            status,
            self.attempts.to_string(),
            format!("{} ms", self.duration_ms),
        ]
    }
}

/// Run totals display wrapper
#[derive(Serialize)]
pub struct SummaryDisplay {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub emission_failures: usize,
}

impl TableDisplay for SummaryDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["TOTAL", "PASSED", "FAILED", "PENDING", "SKIPPED", "RETRIED", "FAILURES"]
    }

    fn row(&self) -> Vec<String> {
        let s = &self.summary;
        vec![
            s.total.to_string(),
            s.passed.to_string(),
            s.failed.to_string(),
            s.pending.to_string(),
            s.skipped.to_string(),
            s.retried.to_string(),
            s.failures.to_string(),
        ]
    }
}

/// Parse a JSON-lines event stream; blank lines are skipped
pub fn parse_events(reader: impl BufRead) -> Result<Vec<DomainEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: DomainEvent = serde_json::from_str(&line)
            .with_context(|| format!("Invalid domain event on line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn read_events(input: &Path) -> Result<Vec<DomainEvent>> {
    let reader: Box<dyn Read> = if input == Path::new("-") {
        Box::new(std::io::stdin())
    } else {
        Box::new(
            File::open(input)
                .with_context(|| format!("Failed to open event stream {}", input.display()))?,
        )
    };
    parse_events(BufReader::new(reader))
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    })
}

/// Replay the stream and return the process exit code
///
/// Test failures are reported through the exit code; a corrupt stream,
/// unreadable input or outstanding async operations are returned as errors.
pub async fn execute(
    args: ReplayArgs,
    mut config: StagehandConfig,
    format: OutputFormat,
) -> Result<i32> {
    args.apply_to(&mut config);
    config.validate()?;

    let events = read_events(&args.input)?;
    info!("Replaying {} events", events.len());

    let stage = Stage::with_clock(Arc::new(SystemClock), config.stage.cue_timeout());
    let reporter = JsonLinesReporter::new(open_output(args.output.as_deref())?);
    let notifier = stage.assign(Notifier::new(config.notifier.clone(), reporter));

    for event in events {
        stage.announce(event)?;
    }
    stage.wait_for_next_cue().await?;

    for failed in stage.failed_operations() {
        warn!("{} failed: {}", failed.description, failed.error.message);
    }

    let notifier = notifier.lock();
    if !notifier.is_finished() {
        print_warning("Event stream ended without TestRunFinished");
    }

    let scenes: Vec<SceneDisplay> = notifier.scenes().iter().map(SceneDisplay::from).collect();
    let totals = SummaryDisplay {
        summary: notifier.summary(),
        emission_failures: notifier.emission_failures(),
    };

    // keep stdout a clean notification stream unless notifications went to a file
    let report = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "scenes": scenes,
            "summary": totals,
        }))?,
        _ => format!(
            "{}\n{}",
            render_list(&scenes, format),
            render_item(&totals, format)
        ),
    };
    if args.output.is_some() {
        println!("{}", report);
    } else {
        eprintln!("{}", report);
    }

    let failures = notifier.failure_count();
    if failures == 0 {
        if args.output.is_some() {
            print_success("All scenes passed");
        }
        Ok(EXIT_PASSED)
    } else {
        warn!("{} scene(s) failed", failures);
        Ok(EXIT_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PASSING_RUN: &str = r#"{"type":"TestRunStarts","timestamp":0}
{"type":"SceneStarts","scene_id":"s1","details":{"name":"Paying with a default card","category":"Checkout","location":{"path":"payments/checkout.feature"}},"timestamp":0}

{"type":"SceneFinished","scene_id":"s1","details":{"name":"Paying with a default card","category":"Checkout"},"outcome":{"kind":"execution_successful"},"timestamp":500}
{"type":"TestRunFinished","timestamp":600}
"#;

    fn args(input: PathBuf, output: PathBuf) -> ReplayArgs {
        ReplayArgs {
            input,
            output: Some(output),
            cid: None,
            specs: vec![],
            success_threshold: None,
            cue_timeout_ms: None,
        }
    }

    #[test]
    fn test_parse_events_skips_blank_lines() {
        let events = parse_events(PASSING_RUN.as_bytes()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].kind(), "SceneStarts");
    }

    #[test]
    fn test_parse_events_names_the_bad_line() {
        let stream = "{\"type\":\"TestRunStarts\",\"timestamp\":0}\nnot json\n";
        let err = parse_events(stream.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = StagehandConfig::default();
        let mut replay = args(PathBuf::from("-"), PathBuf::from("out.jsonl"));
        replay.cid = Some("3-1".to_string());
        replay.specs = vec!["checkout.spec.ts".to_string()];
        replay.success_threshold = Some(OutcomeKind::Pending);
        replay.cue_timeout_ms = Some(1_000);

        replay.apply_to(&mut config);
        assert_eq!(config.notifier.cid, "3-1");
        assert_eq!(config.notifier.specs, vec!["checkout.spec.ts"]);
        assert_eq!(config.notifier.success_threshold, OutcomeKind::Pending);
        assert_eq!(config.stage.cue_timeout_ms, 1_000);
    }

    #[tokio::test]
    async fn test_replay_writes_notifications_and_passes() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("events.jsonl");
        let output = dir.path().join("notifications.jsonl");
        std::fs::write(&input, PASSING_RUN).unwrap();

        let replay = args(input, output.clone());
        let code = execute(replay, StagehandConfig::default(), OutputFormat::Plain)
            .await
            .unwrap();
        assert_eq!(code, EXIT_PASSED);

        let written = std::fs::read_to_string(output).unwrap();
        let names: Vec<String> = written
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            names,
            vec!["suite:start", "test:start", "test:pass", "test:end", "suite:end"]
        );
    }

    #[tokio::test]
    async fn test_replay_exit_code_reflects_failures() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("events.jsonl");
        std::fs::write(
            &input,
            PASSING_RUN.replace(
                r#"{"kind":"execution_successful"}"#,
                r#"{"kind":"execution_failed_with_error","error":{"message":"boom"}}"#,
            ),
        )
        .unwrap();

        let replay = args(input, dir.path().join("out.jsonl"));
        let code = execute(replay, StagehandConfig::default(), OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(code, EXIT_FAILED);
    }

    #[tokio::test]
    async fn test_protocol_violation_is_an_error() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("events.jsonl");
        std::fs::write(
            &input,
            r#"{"type":"SceneFinished","scene_id":"s1","details":{"name":"Orphan"},"outcome":{"kind":"execution_successful"},"timestamp":5}"#,
        )
        .unwrap();

        let replay = args(input, dir.path().join("out.jsonl"));
        let err = execute(replay, StagehandConfig::default(), OutputFormat::Plain)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Protocol violation"));
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            args(dir.path().join("missing.jsonl"), dir.path().join("out.jsonl")),
            StagehandConfig::default(),
            OutputFormat::Plain,
        )
        .await;
        assert!(result.is_err());
    }
}
