//! Reporter and lifecycle hook contracts, plus the stock implementations

use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

use super::payload::{HookResult, HookTest, NativePayload, SuitePayload};
use crate::error::{Error, Result};

/// Native event-emitter contract (`emit(eventName, payload)`)
pub trait Reporter: Send {
    fn emit(&mut self, event_name: &str, payload: &NativePayload) -> Result<()>;
}

/// Lifecycle hooks configured by the test author; every hook defaults to a no-op
pub trait LifecycleHooks: Send {
    fn before_suite(&mut self, _suite: &SuitePayload) -> Result<()> {
        Ok(())
    }

    fn after_suite(&mut self, _suite: &SuitePayload) -> Result<()> {
        Ok(())
    }

    fn before_test(&mut self, _test: &HookTest, _context: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn after_test(
        &mut self,
        _test: &HookTest,
        _context: &serde_json::Value,
        _result: &HookResult,
    ) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

#[derive(Serialize)]
struct Line<'a> {
    event: &'a str,
    payload: &'a NativePayload,
}

/// Writes one `{"event": .., "payload": ..}` JSON object per line
pub struct JsonLinesReporter<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Reporter for JsonLinesReporter<W> {
    fn emit(&mut self, event_name: &str, payload: &NativePayload) -> Result<()> {
        let line = serde_json::to_string(&Line {
            event: event_name,
            payload,
        })?;
        writeln!(self.writer, "{}", line)
            .and_then(|_| self.writer.flush())
            .map_err(|e| Error::Reporter(format!("failed to write {}: {}", event_name, e)))
    }
}

/// Keeps every emitted notification in memory; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    emitted: Arc<Mutex<Vec<(String, NativePayload)>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<(String, NativePayload)> {
        self.emitted.lock().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.emitted.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Event names paired with payload titles, e.g. `("suite:start", "Checkout")`
    pub fn timeline(&self) -> Vec<(String, String)> {
        self.emitted
            .lock()
            .iter()
            .map(|(name, payload)| (name.clone(), payload.title().to_string()))
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn emit(&mut self, event_name: &str, payload: &NativePayload) -> Result<()> {
        self.emitted
            .lock()
            .push((event_name.to_string(), payload.clone()));
        Ok(())
    }
}

/// A single hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    BeforeSuite(SuitePayload),
    AfterSuite(SuitePayload),
    BeforeTest(HookTest, serde_json::Value),
    AfterTest(HookTest, serde_json::Value, HookResult),
}

/// Keeps every hook invocation in memory; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    calls: Arc<Mutex<Vec<HookCall>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }
}

impl LifecycleHooks for RecordingHooks {
    fn before_suite(&mut self, suite: &SuitePayload) -> Result<()> {
        self.calls.lock().push(HookCall::BeforeSuite(suite.clone()));
        Ok(())
    }

    fn after_suite(&mut self, suite: &SuitePayload) -> Result<()> {
        self.calls.lock().push(HookCall::AfterSuite(suite.clone()));
        Ok(())
    }

    fn before_test(&mut self, test: &HookTest, context: &serde_json::Value) -> Result<()> {
        self.calls
            .lock()
            .push(HookCall::BeforeTest(test.clone(), context.clone()));
        Ok(())
    }

    fn after_test(
        &mut self,
        test: &HookTest,
        context: &serde_json::Value,
        result: &HookResult,
    ) -> Result<()> {
        self.calls.lock().push(HookCall::AfterTest(
            test.clone(),
            context.clone(),
            result.clone(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::payload::TestPayload;

    fn test_payload(kind: &str) -> NativePayload {
        NativePayload::Test(TestPayload {
            kind: kind.to_string(),
            uid: "s1".to_string(),
            cid: "0-0".to_string(),
            title: "Pays".to_string(),
            full_title: "Checkout Pays".to_string(),
            parent: "Checkout".to_string(),
            file: "checkout.spec.ts".to_string(),
            specs: vec![],
            pending: false,
            duration: Some(12),
            error: None,
        })
    }

    #[test]
    fn test_json_lines_reporter_writes_one_object_per_line() {
        let mut reporter = JsonLinesReporter::new(Vec::new());
        reporter.emit("test:start", &test_payload("test:start")).unwrap();
        reporter.emit("test:end", &test_payload("test:end")).unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "test:start");
        assert_eq!(lines[1]["payload"]["fullTitle"], "Checkout Pays");
        assert_eq!(lines[1]["payload"]["duration"], 12);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures_surface_as_reporter_errors() {
        let mut reporter = JsonLinesReporter::new(BrokenPipe);
        let err = reporter.emit("test:start", &test_payload("test:start")).unwrap_err();
        assert!(matches!(err, Error::Reporter(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_recording_reporter_clones_share_the_log() {
        let reporter = RecordingReporter::new();
        let mut handle = reporter.clone();
        handle.emit("test:start", &test_payload("test:start")).unwrap();

        assert_eq!(reporter.event_names(), vec!["test:start"]);
        assert_eq!(reporter.timeline(), vec![("test:start".to_string(), "Pays".to_string())]);
    }
}
