//! Notifier: translates the canonical event stream into native reporter events
//!
//! The notifier is a [`StageCrewMember`]. It keeps the
//! `test run -> suite -> nested suite -> test` model, emits `suite:*` and
//! `test:*` notifications to a [`Reporter`], and invokes the configured
//! [`LifecycleHooks`]. It also records every finalized scene so the run's
//! `failure_count()` can decide the process exit code.

mod payload;
mod reporter;
mod scene;
mod suite;

pub use payload::{
    ErrorPayload, HookResult, HookTest, NativePayload, Retries, SuitePayload, TestPayload,
};
pub use reporter::{
    HookCall, JsonLinesReporter, LifecycleHooks, NoHooks, RecordingHooks, RecordingReporter,
    Reporter,
};
pub use scene::{SceneMetadata, ScenePhase, SceneState, TestNode};
pub use suite::{derived_uid, SuiteFrame, SuiteOrigin, SuiteStack, SuiteTransition};

use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, trace, warn};

use crate::aggregate::{RunSummary, SceneLedger, SceneRecord, TestStatus};
use crate::clock::Timestamp;
use crate::config::NotifierConfig;
use crate::correlation::CorrelationId;
use crate::error::{Error, Result};
use crate::events::DomainEvent;
use crate::model::{Outcome, RetryAttempt, ScenarioDetails, TestSuiteDetails};
use crate::stage::{Stage, StageCrewMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    NotStarted,
    Running,
    Finishing,
    Finished,
}

/// Translates domain events into native test-runner notifications
pub struct Notifier {
    config: NotifierConfig,
    reporter: Box<dyn Reporter>,
    hooks: Box<dyn LifecycleHooks>,
    run: RunPhase,
    /// A scene, suite or activity event has been translated
    lifecycle_seen: bool,
    suites: SuiteStack,
    scenes: HashMap<CorrelationId, SceneState>,
    /// Scenes not yet finalized, in start order
    active: Vec<CorrelationId>,
    /// Metadata announced before its scene started
    stashed: HashMap<CorrelationId, Vec<SceneMetadata>>,
    seen_activities: HashSet<CorrelationId>,
    ledger: SceneLedger,
    violation: Option<String>,
    emission_failures: usize,
}

impl Notifier {
    pub fn new(config: NotifierConfig, reporter: impl Reporter + 'static) -> Self {
        Self {
            config,
            reporter: Box::new(reporter),
            hooks: Box::new(NoHooks),
            run: RunPhase::NotStarted,
            lifecycle_seen: false,
            suites: SuiteStack::new(),
            scenes: HashMap::new(),
            active: Vec::new(),
            stashed: HashMap::new(),
            seen_activities: HashSet::new(),
            ledger: SceneLedger::new(),
            violation: None,
            emission_failures: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Number of finalized scenes whose outcome is worse than the success threshold
    pub fn failure_count(&self) -> usize {
        self.ledger.failure_count(self.config.success_threshold)
    }

    pub fn summary(&self) -> RunSummary {
        self.ledger.summary(self.config.success_threshold)
    }

    /// Finalized scenes in the order they were reported
    pub fn scenes(&self) -> &[SceneRecord] {
        self.ledger.scenes()
    }

    /// The protocol violation that aborted translation, if any
    pub fn violation(&self) -> Option<&str> {
        self.violation.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.violation.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.run == RunPhase::Finished
    }

    /// Reporter and hook calls that failed
    pub fn emission_failures(&self) -> usize {
        self.emission_failures
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Translate a single event
    ///
    /// Returns a protocol violation for a corrupt stream; once that happens
    /// every later event is ignored.
    pub fn handle(&mut self, event: &DomainEvent) -> Result<()> {
        if let Some(violation) = &self.violation {
            warn!("Ignoring {} after {}", event.describe(), violation);
            return Ok(());
        }

        debug!("Notifier received {}", event.describe());

        match self.translate(event) {
            Err(e) if e.is_fatal() => {
                error!("{}", e);
                self.violation = Some(e.to_string());
                Err(e)
            }
            other => other,
        }
    }

    fn translate(&mut self, event: &DomainEvent) -> Result<()> {
        if self.run == RunPhase::Finished {
            let expected = match event {
                DomainEvent::TestRunFinished { .. } => "a single TestRunFinished",
                _ => "no events after TestRunFinished",
            };
            return Err(Error::protocol(event.describe(), expected));
        }

        let lifecycle = !matches!(
            event,
            DomainEvent::TestRunStarts { .. }
                | DomainEvent::TestRunFinishes { .. }
                | DomainEvent::TestRunFinished { .. }
                | DomainEvent::AsyncOperationAttempted { .. }
                | DomainEvent::AsyncOperationCompleted { .. }
                | DomainEvent::AsyncOperationFailed { .. }
        );
        if lifecycle {
            self.lifecycle_seen = true;
        }

        match event {
            DomainEvent::TestRunStarts { .. } => {
                if self.run != RunPhase::NotStarted {
                    return Err(Error::protocol(event.describe(), "a single TestRunStarts"));
                }
                if self.lifecycle_seen {
                    return Err(Error::protocol(
                        event.describe(),
                        "TestRunStarts before any scene or suite event",
                    ));
                }
                info!("Test run started");
                self.run = RunPhase::Running;
                Ok(())
            }
            DomainEvent::TestRunnerDetected { scene_id, name, .. } => {
                self.describe_scene(scene_id, SceneMetadata::TestRunner(name.clone()));
                Ok(())
            }
            DomainEvent::SceneSequenceDetected {
                scene_id,
                template_id,
                details,
                ..
            } => {
                self.describe_scene(
                    scene_id,
                    SceneMetadata::Sequence {
                        template_id: template_id.clone(),
                        details: details.clone(),
                    },
                );
                Ok(())
            }
            DomainEvent::SceneParametersDetected {
                scene_id,
                parameters,
                ..
            } => {
                self.describe_scene(scene_id, SceneMetadata::Parameters(parameters.clone()));
                Ok(())
            }
            DomainEvent::SceneTagged { scene_id, tag, .. } => {
                self.describe_scene(scene_id, SceneMetadata::Tagged(tag.clone()));
                Ok(())
            }
            DomainEvent::SceneDescriptionDetected {
                scene_id,
                description,
                ..
            } => {
                self.describe_scene(scene_id, SceneMetadata::Description(description.clone()));
                Ok(())
            }
            DomainEvent::TestSuiteStarts { details, timestamp } => {
                self.suite_starts(details, *timestamp);
                Ok(())
            }
            DomainEvent::TestSuiteFinished {
                details, timestamp, ..
            } => self.suite_finished(event, details, *timestamp),
            DomainEvent::SceneStarts {
                scene_id,
                details,
                retry,
                timestamp,
            } => self.scene_starts(event, scene_id, details, *retry, *timestamp),
            DomainEvent::ActivityStarts {
                scene_id,
                activity_id,
                ..
            } => self.activity_starts(event, scene_id, activity_id),
            DomainEvent::ActivityFinished {
                scene_id,
                activity_id,
                ..
            } => self.activity_finished(event, scene_id, activity_id),
            DomainEvent::SceneFinishes {
                scene_id, outcome, ..
            } => self.scene_finishes(event, scene_id, outcome.as_ref()),
            DomainEvent::SceneFinished {
                scene_id,
                outcome,
                timestamp,
                ..
            } => self.scene_finished(event, scene_id, outcome, *timestamp),
            DomainEvent::AsyncOperationAttempted { .. }
            | DomainEvent::AsyncOperationCompleted { .. }
            | DomainEvent::AsyncOperationFailed { .. } => {
                trace!("Notifier ignores {}", event.describe());
                Ok(())
            }
            DomainEvent::TestRunFinishes { timestamp } => {
                self.wrap_up(*timestamp);
                self.run = RunPhase::Finishing;
                Ok(())
            }
            DomainEvent::TestRunFinished { timestamp, .. } => {
                self.wrap_up(*timestamp);
                self.run = RunPhase::Finished;
                let summary = self.summary();
                info!(
                    "Test run finished: {} scenes, {} passed, {} failed, {} pending, {} skipped",
                    summary.total, summary.passed, summary.failed, summary.pending, summary.skipped
                );
                Ok(())
            }
        }
    }

    // ========================================================================
    // Scenes
    // ========================================================================

    fn describe_scene(&mut self, scene_id: &CorrelationId, metadata: SceneMetadata) {
        match self.scenes.get_mut(scene_id) {
            Some(scene) => scene.apply(metadata),
            None if self.ledger.contains(scene_id) => {
                debug!("Ignoring metadata for finalized scene {}", scene_id);
            }
            None => self.stashed.entry(scene_id.clone()).or_default().push(metadata),
        }
    }

    fn scene_starts(
        &mut self,
        event: &DomainEvent,
        scene_id: &CorrelationId,
        details: &ScenarioDetails,
        retry: Option<RetryAttempt>,
        at: Timestamp,
    ) -> Result<()> {
        if self.ledger.contains(scene_id) {
            return Err(Error::protocol(
                event.describe(),
                format!("a scene id other than finalized {}", scene_id),
            ));
        }

        self.settle(Some(scene_id));

        match self.scenes.get_mut(scene_id) {
            Some(scene) if scene.phase == ScenePhase::Retrying => {
                debug!("Scene {} starts another attempt ({:?})", scene_id, retry);
                scene.phase = ScenePhase::InProgress;
                scene.retry = retry;
                scene.finishing_outcome = None;
                Ok(())
            }
            Some(_) => Err(Error::protocol(
                event.describe(),
                format!("SceneFinished({}) before it starts again", scene_id),
            )),
            None => {
                let mut scene = SceneState::new(scene_id.clone(), details.clone(), retry, at);
                for metadata in self.stashed.remove(scene_id).unwrap_or_default() {
                    scene.apply(metadata);
                }
                self.scenes.insert(scene_id.clone(), scene);
                self.active.push(scene_id.clone());
                Ok(())
            }
        }
    }

    fn require_running(&self, event: &DomainEvent, scene_id: &CorrelationId) -> Result<()> {
        match self.scenes.get(scene_id) {
            Some(scene) if scene.is_running() => Ok(()),
            _ => Err(Error::protocol(
                event.describe(),
                format!("SceneStarts({})", scene_id),
            )),
        }
    }

    fn activity_starts(
        &mut self,
        event: &DomainEvent,
        scene_id: &CorrelationId,
        activity_id: &CorrelationId,
    ) -> Result<()> {
        self.require_running(event, scene_id)?;
        if !self.seen_activities.insert(activity_id.clone()) {
            return Err(Error::protocol(event.describe(), "a fresh activity id"));
        }

        self.settle(Some(scene_id));
        self.open_scene(scene_id);
        if let Some(scene) = self.scenes.get_mut(scene_id) {
            scene.open_activities.insert(activity_id.clone());
        }
        Ok(())
    }

    fn activity_finished(
        &mut self,
        event: &DomainEvent,
        scene_id: &CorrelationId,
        activity_id: &CorrelationId,
    ) -> Result<()> {
        self.require_running(event, scene_id)?;

        let was_open = self
            .scenes
            .get_mut(scene_id)
            .map(|scene| scene.open_activities.remove(activity_id))
            .unwrap_or(false);
        if !was_open {
            return Err(Error::protocol(
                event.describe(),
                format!("ActivityStarts({})", activity_id),
            ));
        }
        Ok(())
    }

    fn scene_finishes(
        &mut self,
        event: &DomainEvent,
        scene_id: &CorrelationId,
        outcome: Option<&Outcome>,
    ) -> Result<()> {
        self.require_running(event, scene_id)?;
        self.settle(Some(scene_id));
        self.open_scene(scene_id);

        if let Some(scene) = self.scenes.get_mut(scene_id) {
            scene.phase = ScenePhase::Finishing;
            scene.finishing_outcome = outcome.cloned();
        }
        Ok(())
    }

    fn scene_finished(
        &mut self,
        event: &DomainEvent,
        scene_id: &CorrelationId,
        outcome: &Outcome,
        at: Timestamp,
    ) -> Result<()> {
        self.require_running(event, scene_id)?;
        self.settle(Some(scene_id));
        self.open_scene(scene_id);
        self.suites.record_scene_finished(at);

        let terminal = match self.scenes.get_mut(scene_id) {
            Some(scene) => {
                if !scene.open_activities.is_empty() {
                    warn!(
                        "Scene {} finished with {} unfinished activities",
                        scene_id,
                        scene.open_activities.len()
                    );
                    scene.open_activities.clear();
                }
                scene.attempts.push(outcome.clone());
                scene.finished_at = Some(at);

                let terminal = scene.is_terminal(outcome);
                if !terminal {
                    debug!("Scene {} will be retried, holding {}", scene_id, outcome);
                    scene.phase = ScenePhase::Retrying;
                }
                terminal
            }
            None => false,
        };

        if terminal {
            self.finalize(scene_id);
        }
        Ok(())
    }

    /// Open scenes still waiting for their first lifecycle event and finalize
    /// buffered retries, except for `current`
    fn settle(&mut self, current: Option<&CorrelationId>) {
        let others: Vec<CorrelationId> = self
            .active
            .iter()
            .filter(|id| Some(*id) != current)
            .cloned()
            .collect();

        for scene_id in others {
            let state = self.scenes.get(&scene_id).map(|s| (s.phase, s.is_opened()));
            match state {
                Some((ScenePhase::Retrying, _)) => self.finalize(&scene_id),
                Some((_, false)) => self.open_scene(&scene_id),
                _ => {}
            }
        }
    }

    /// Place the scene in the suite tree and emit `test:start`
    fn open_scene(&mut self, scene_id: &CorrelationId) {
        let (path, file, title, started_at) = match self.scenes.get(scene_id) {
            Some(scene) if !scene.is_opened() => (
                scene.suite_path(),
                scene.details.location.path.clone(),
                scene.title().to_string(),
                scene.started_at,
            ),
            _ => return,
        };

        let transitions = self.suites.reconcile(&path, &file, started_at);
        self.report_suites(transitions);

        let innermost = self.suites.innermost();
        let node = TestNode {
            uid: scene_id.value().to_string(),
            parent: innermost.map(|f| f.title.clone()).unwrap_or_default(),
            full_title: self.suites.full_title_of(&title),
            file: if file.is_empty() {
                innermost.map(|f| f.file.clone()).unwrap_or_default()
            } else {
                file
            },
            title,
        };

        if let Some(scene) = self.scenes.get_mut(scene_id) {
            scene.node = Some(node.clone());
        }

        debug!("Test started: {}", node.full_title);
        let payload = self.test_payload("test:start", &node, false, None, None);
        self.emit(payload);

        let result = self.hooks.before_test(&hook_test(&node, false), &json!({}));
        self.hook_outcome("beforeTest", result);
    }

    /// Report the scene's merged outcome and record it
    fn finalize(&mut self, scene_id: &CorrelationId) {
        self.open_scene(scene_id);

        let mut scene = match self.scenes.remove(scene_id) {
            Some(scene) => scene,
            None => return,
        };
        self.active.retain(|id| id != scene_id);
        scene.phase = ScenePhase::Finalized;

        let (node, outcome) = match (scene.node.clone(), scene.merged_outcome()) {
            (Some(node), Some(outcome)) => (node, outcome),
            _ => {
                warn!("Scene {} has nothing to report", scene_id);
                return;
            }
        };

        let status = TestStatus::of(outcome.kind());
        let duration = scene.duration_ms();
        let error = match status {
            TestStatus::Failed | TestStatus::Pending => outcome.error().map(ErrorPayload::from),
            TestStatus::Passed | TestStatus::Skipped => None,
        };
        let event_name = match status {
            TestStatus::Passed => "test:pass",
            TestStatus::Failed => "test:fail",
            TestStatus::Pending => "test:pending",
            TestStatus::Skipped => "test:skipped",
        };
        let pending = status == TestStatus::Pending;

        let payload = self.test_payload(event_name, &node, pending, Some(duration), error.clone());
        self.emit(payload);
        let payload = self.test_payload("test:end", &node, pending, Some(duration), error.clone());
        self.emit(payload);

        let result = HookResult {
            passed: status == TestStatus::Passed,
            duration,
            retries: scene.retries(),
            exception: error.as_ref().map(|e| e.message.clone()).unwrap_or_default(),
            status,
            error,
        };
        let outcome_of_hook = self
            .hooks
            .after_test(&hook_test(&node, pending), &json!({}), &result);
        self.hook_outcome("afterTest", outcome_of_hook);

        info!("Test {}: {}", status, node.full_title);
        self.ledger.record(SceneRecord {
            scene_id: scene_id.clone(),
            title: node.title,
            full_title: node.full_title,
            file: node.file,
            outcome,
            attempts: scene.attempts.len() as u32,
            duration: std::time::Duration::from_millis(duration),
        });
    }

    // ========================================================================
    // Suites and run
    // ========================================================================

    fn suite_starts(&mut self, details: &TestSuiteDetails, at: Timestamp) {
        self.settle(None);
        let transition = self.suites.open_explicit(
            &details.correlation_id,
            details.name.value(),
            &details.location.path,
            at,
        );
        self.report_suites(vec![transition]);
    }

    fn suite_finished(
        &mut self,
        event: &DomainEvent,
        details: &TestSuiteDetails,
        at: Timestamp,
    ) -> Result<()> {
        self.settle(None);
        let transitions = self
            .suites
            .close_explicit(&details.correlation_id, &event.describe(), at)?;
        self.report_suites(transitions);
        Ok(())
    }

    /// Finalize everything still open and close every suite
    fn wrap_up(&mut self, at: Timestamp) {
        for scene_id in self.active.clone() {
            let phase = self.scenes.get(&scene_id).map(|s| s.phase);
            match phase {
                Some(ScenePhase::Retrying) => self.finalize(&scene_id),
                Some(_) => self.abandon(&scene_id, at),
                None => {}
            }
        }

        if self.suites.has_explicit() {
            warn!("Test run ended with unfinished test suites");
        }
        let transitions = self.suites.close_all(at);
        self.report_suites(transitions);

        if !self.stashed.is_empty() {
            debug!("Discarding metadata for {} scenes that never started", self.stashed.len());
            self.stashed.clear();
        }
    }

    /// Finalize a scene that never finished as failed
    fn abandon(&mut self, scene_id: &CorrelationId, at: Timestamp) {
        if let Some(scene) = self.scenes.get_mut(scene_id) {
            warn!("Scene {} did not finish before the test run ended", scene_id);
            let message = format!("{} did not finish before the test run ended", scene.title());
            scene.attempts.push(Outcome::failed_with_error(message));
            scene.finished_at = Some(at);
        }
        self.finalize(scene_id);
    }

    // ========================================================================
    // Emission
    // ========================================================================

    fn report_suites(&mut self, transitions: Vec<SuiteTransition>) {
        for transition in transitions {
            match transition {
                SuiteTransition::Opened(frame) => {
                    info!("Suite started: {}", frame.full_title);
                    let payload = self.suite_payload("suite:start", &frame, None);
                    self.emit(NativePayload::Suite(payload.clone()));
                    let result = self.hooks.before_suite(&payload);
                    self.hook_outcome("beforeSuite", result);
                }
                SuiteTransition::Closed { frame, finished_at } => {
                    info!("Suite finished: {}", frame.full_title);
                    let duration = frame.duration_until(finished_at);
                    let payload = self.suite_payload("suite:end", &frame, Some(duration));
                    self.emit(NativePayload::Suite(payload.clone()));
                    let result = self.hooks.after_suite(&payload);
                    self.hook_outcome("afterSuite", result);
                }
            }
        }
    }

    fn suite_payload(&self, kind: &str, frame: &SuiteFrame, duration: Option<u64>) -> SuitePayload {
        SuitePayload {
            kind: kind.to_string(),
            uid: frame.uid.clone(),
            cid: self.config.cid.clone(),
            title: frame.title.clone(),
            full_title: frame.full_title.clone(),
            parent: frame.parent.clone(),
            file: frame.file.clone(),
            specs: self.config.specs.clone(),
            pending: false,
            duration,
        }
    }

    fn test_payload(
        &self,
        kind: &str,
        node: &TestNode,
        pending: bool,
        duration: Option<u64>,
        error: Option<ErrorPayload>,
    ) -> NativePayload {
        NativePayload::Test(TestPayload {
            kind: kind.to_string(),
            uid: node.uid.clone(),
            cid: self.config.cid.clone(),
            title: node.title.clone(),
            full_title: node.full_title.clone(),
            parent: node.parent.clone(),
            file: node.file.clone(),
            specs: self.config.specs.clone(),
            pending,
            duration,
            error,
        })
    }

    fn emit(&mut self, payload: NativePayload) {
        let event_name = payload.kind().to_string();
        if let Err(e) = self.reporter.emit(&event_name, &payload) {
            warn!("Reporter failed to handle {}: {}", event_name, e);
            self.emission_failures += 1;
        }
    }

    fn hook_outcome(&mut self, hook: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!("{} hook failed: {}", hook, e);
            self.emission_failures += 1;
        }
    }
}

fn hook_test(node: &TestNode, pending: bool) -> HookTest {
    HookTest {
        ctx: json!({}),
        file: node.file.clone(),
        full_name: node.full_title.clone(),
        full_title: node.full_title.clone(),
        parent: node.parent.clone(),
        pending,
        title: node.title.clone(),
        kind: "test".to_string(),
    }
}

impl StageCrewMember for Notifier {
    fn notify_of(&mut self, event: &DomainEvent, _stage: &Stage) -> Result<()> {
        self.handle(event)
    }

    fn name(&self) -> &str {
        "notifier"
    }
}
