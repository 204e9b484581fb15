//! Outcome aggregation
//!
//! Worst-outcome-wins merging, failure classification against a threshold,
//! and the ledger of finalized scenes behind `failure_count()` and the run
//! summary.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::correlation::CorrelationId;
use crate::model::{Outcome, OutcomeKind};

/// Status reported to native test-runner reporters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Skipped,
    Pending,
    Failed,
}

const STATUS_TABLE: [(OutcomeKind, TestStatus); 7] = [
    (OutcomeKind::Successful, TestStatus::Passed),
    (OutcomeKind::Skipped, TestStatus::Skipped),
    (OutcomeKind::Ignored, TestStatus::Skipped),
    (OutcomeKind::Pending, TestStatus::Pending),
    (OutcomeKind::FailedWithAssertionError, TestStatus::Failed),
    (OutcomeKind::FailedWithError, TestStatus::Failed),
    (OutcomeKind::Compromised, TestStatus::Failed),
];

impl TestStatus {
    pub fn of(kind: OutcomeKind) -> Self {
        STATUS_TABLE
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, status)| *status)
            .unwrap_or(TestStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Skipped => "skipped",
            TestStatus::Pending => "pending",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The more severe of two outcomes; `a` wins a tie
pub fn worst_of(a: Outcome, b: Outcome) -> Outcome {
    if b.is_worse_than(&a) {
        b
    } else {
        a
    }
}

/// Whether an outcome counts as a failure given the success threshold
pub fn is_failure(outcome: &Outcome, threshold: OutcomeKind) -> bool {
    outcome.kind() > threshold
}

/// Merge the outcomes of every attempt of a retried scene
///
/// Ignored attempts only stand when nothing else was reported; otherwise the
/// worst non-ignored attempt wins.
pub fn merge_attempts(attempts: &[Outcome]) -> Option<Outcome> {
    let reported = attempts
        .iter()
        .filter(|o| o.kind() != OutcomeKind::Ignored)
        .cloned()
        .reduce(worst_of);

    reported.or_else(|| attempts.last().cloned())
}

/// A scene whose outcome has been notified downstream
#[derive(Debug, Clone, Serialize)]
pub struct SceneRecord {
    pub scene_id: CorrelationId,
    pub title: String,
    pub full_title: String,
    pub file: String,
    pub outcome: Outcome,
    pub attempts: u32,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl SceneRecord {
    pub fn status(&self) -> TestStatus {
        TestStatus::of(self.outcome.kind())
    }
}

/// Run-level counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    /// Scenes that needed more than one attempt
    pub retried: usize,
    /// Scenes above the success threshold
    pub failures: usize,
    pub worst: Option<OutcomeKind>,
}

/// Finalized scenes, one entry per scene id
#[derive(Debug, Default)]
pub struct SceneLedger {
    scenes: Vec<SceneRecord>,
    recorded: HashSet<CorrelationId>,
}

impl SceneLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized scene; returns false if the scene id was already recorded
    pub fn record(&mut self, record: SceneRecord) -> bool {
        if !self.recorded.insert(record.scene_id.clone()) {
            return false;
        }
        self.scenes.push(record);
        true
    }

    pub fn contains(&self, scene_id: &CorrelationId) -> bool {
        self.recorded.contains(scene_id)
    }

    pub fn scenes(&self) -> &[SceneRecord] {
        &self.scenes
    }

    pub fn failure_count(&self, threshold: OutcomeKind) -> usize {
        self.scenes
            .iter()
            .filter(|s| is_failure(&s.outcome, threshold))
            .count()
    }

    /// Worst outcome across all finalized scenes
    pub fn worst_outcome(&self) -> Option<Outcome> {
        self.scenes.iter().map(|s| s.outcome.clone()).reduce(worst_of)
    }

    pub fn summary(&self, threshold: OutcomeKind) -> RunSummary {
        let mut summary = RunSummary {
            total: self.scenes.len(),
            failures: self.failure_count(threshold),
            worst: self.scenes.iter().map(|s| s.outcome.kind()).max(),
            ..Default::default()
        };

        for scene in &self.scenes {
            match scene.status() {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Pending => summary.pending += 1,
                TestStatus::Skipped => summary.skipped += 1,
            }
            if scene.attempts > 1 {
                summary.retried += 1;
            }
        }

        summary
    }
}
