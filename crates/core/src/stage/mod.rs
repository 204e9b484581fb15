//! Stage: the run-scoped event bus
//!
//! Actors and adapters announce [`DomainEvent`]s on a [`Stage`]; the stage
//! hands each event, in announcement order, to every assigned
//! [`StageCrewMember`] before `announce` returns. Announcements made while a
//! delivery is in flight are queued behind it, so no receiver ever observes
//! events out of order or re-entrantly.
//!
//! The stage also keeps a ledger of asynchronous operations so that callers
//! can wait for them to settle with [`Stage::wait_for_next_cue`].

mod crew;
mod ledger;

pub use crew::StageCrewMember;
pub use ledger::{FailedOperation, OperationLedger, PendingOperation};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, trace};

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::correlation::CorrelationId;
use crate::error::{Error, Result};
use crate::events::DomainEvent;

/// Default drain barrier timeout
pub const DEFAULT_CUE_TIMEOUT: Duration = Duration::from_millis(250);

type SharedCrewMember = Arc<Mutex<dyn StageCrewMember>>;

/// Run-scoped event bus; clones share the same stage
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

struct StageInner {
    clock: Arc<dyn Clock>,
    cue_timeout: Duration,
    crew: Mutex<Vec<SharedCrewMember>>,
    delivery: Mutex<Delivery>,
    ledger: Mutex<OperationLedger>,
    ledger_changed: Notify,
    current_scene: Mutex<Option<CorrelationId>>,
}

#[derive(Default)]
struct Delivery {
    in_flight: bool,
    queue: VecDeque<DomainEvent>,
}

/// Resets the delivery state if a receiver panics mid-delivery
struct InFlight<'a> {
    delivery: &'a Mutex<Delivery>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut delivery = self.delivery.lock();
            delivery.in_flight = false;
            delivery.queue.clear();
        }
    }
}

impl Stage {
    /// Create a stage using the wall clock and the default cue timeout
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_CUE_TIMEOUT)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, cue_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StageInner {
                clock,
                cue_timeout,
                crew: Mutex::new(Vec::new()),
                delivery: Mutex::new(Delivery::default()),
                ledger: Mutex::new(OperationLedger::default()),
                ledger_changed: Notify::new(),
                current_scene: Mutex::new(None),
            }),
        }
    }

    /// Assign a crew member; returns a shared handle for inspecting it later
    pub fn assign<M: StageCrewMember + 'static>(&self, member: M) -> Arc<Mutex<M>> {
        let member = Arc::new(Mutex::new(member));
        self.assign_shared(member.clone());
        member
    }

    /// Assign a crew member the caller already shares
    pub fn assign_shared(&self, member: SharedCrewMember) {
        debug!("Assigned {} to the stage", member.lock().name());
        self.inner.crew.lock().push(member);
    }

    pub fn crew_size(&self) -> usize {
        self.inner.crew.lock().len()
    }

    /// Deliver an event to every crew member, in registration order
    ///
    /// Returns the first error any crew member reported for this event or for
    /// events queued behind it while it was delivered. Every crew member still
    /// receives every event.
    pub fn announce(&self, event: DomainEvent) -> Result<()> {
        {
            let mut delivery = self.inner.delivery.lock();
            delivery.queue.push_back(event);
            if delivery.in_flight {
                trace!("Delivery in flight, queued event");
                return Ok(());
            }
            delivery.in_flight = true;
        }

        let _guard = InFlight {
            delivery: &self.inner.delivery,
        };
        let mut first_error = None;

        loop {
            let event = {
                let mut delivery = self.inner.delivery.lock();
                match delivery.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        delivery.in_flight = false;
                        break;
                    }
                }
            };

            if let Err(e) = self.deliver(&event) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn deliver(&self, event: &DomainEvent) -> Result<()> {
        trace!("Delivering {}", event.describe());

        match event {
            DomainEvent::SceneStarts { scene_id, .. } => {
                *self.inner.current_scene.lock() = Some(scene_id.clone());
            }
            DomainEvent::SceneFinished { scene_id, .. } => {
                let mut current = self.inner.current_scene.lock();
                if current.as_ref() == Some(scene_id) {
                    *current = None;
                }
            }
            _ => {}
        }

        if self.inner.ledger.lock().track(event) {
            self.inner.ledger_changed.notify_waiters();
        }

        let crew: Vec<SharedCrewMember> = self.inner.crew.lock().clone();
        let mut first_error = None;

        for member in crew {
            let mut member = member.lock();
            if let Err(e) = member.notify_of(event, self) {
                error!("{} failed on {}: {}", member.name(), event.describe(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait until every attempted async operation has completed or failed
    pub async fn wait_for_next_cue(&self) -> Result<()> {
        self.wait_for_next_cue_within(self.inner.cue_timeout).await
    }

    pub async fn wait_for_next_cue_within(&self, timeout: Duration) -> Result<()> {
        let settled = async {
            loop {
                let notified = self.inner.ledger_changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.inner.ledger.lock().is_settled() {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, settled).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let descriptions = self
                    .inner
                    .ledger
                    .lock()
                    .outstanding()
                    .iter()
                    .map(|op| op.description.clone())
                    .collect();
                Err(Error::OutstandingAsyncOperations {
                    timeout_ms: timeout.as_millis() as u64,
                    descriptions,
                })
            }
        }
    }

    pub fn outstanding_operations(&self) -> Vec<PendingOperation> {
        self.inner.ledger.lock().outstanding().to_vec()
    }

    pub fn failed_operations(&self) -> Vec<FailedOperation> {
        self.inner.ledger.lock().failed().to_vec()
    }

    pub fn current_time(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn cue_timeout(&self) -> Duration {
        self.inner.cue_timeout
    }

    pub fn new_correlation_id(&self) -> CorrelationId {
        CorrelationId::create()
    }

    /// Scene currently in progress, if any
    pub fn current_scene_id(&self) -> Option<CorrelationId> {
        self.inner.current_scene.lock().clone()
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{ProblemIndication, ScenarioDetails};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl StageCrewMember for Recorder {
        fn notify_of(&mut self, event: &DomainEvent, _stage: &Stage) -> Result<()> {
            self.seen.push(event.kind().to_string());
            Ok(())
        }
    }

    /// Announces a follow-up event while handling TestRunStarts
    struct Echo;

    impl StageCrewMember for Echo {
        fn notify_of(&mut self, event: &DomainEvent, stage: &Stage) -> Result<()> {
            if let DomainEvent::TestRunStarts { timestamp } = event {
                stage.announce(DomainEvent::TestRunFinishes {
                    timestamp: *timestamp,
                })?;
            }
            Ok(())
        }
    }

    struct Failing;

    impl StageCrewMember for Failing {
        fn notify_of(&mut self, event: &DomainEvent, _stage: &Stage) -> Result<()> {
            Err(Error::protocol(event.describe(), "nothing"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn manual_stage() -> Stage {
        Stage::with_clock(Arc::new(ManualClock::starting_at(ts(0))), Duration::from_millis(50))
    }

    #[test]
    fn test_delivers_in_order_to_all_crew() {
        let stage = manual_stage();
        let first = stage.assign(Recorder::default());
        let second = stage.assign(Recorder::default());

        stage.announce(DomainEvent::TestRunStarts { timestamp: ts(0) }).unwrap();
        stage.announce(DomainEvent::TestRunFinishes { timestamp: ts(1) }).unwrap();

        assert_eq!(first.lock().seen, vec!["TestRunStarts", "TestRunFinishes"]);
        assert_eq!(second.lock().seen, first.lock().seen);
        assert_eq!(stage.crew_size(), 2);
    }

    #[test]
    fn test_reentrant_announcements_are_queued() {
        let stage = manual_stage();
        stage.assign(Echo);
        let recorder = stage.assign(Recorder::default());

        stage.announce(DomainEvent::TestRunStarts { timestamp: ts(0) }).unwrap();

        // The recorder sees TestRunStarts before the echo, despite being assigned after Echo
        assert_eq!(recorder.lock().seen, vec!["TestRunStarts", "TestRunFinishes"]);
    }

    #[test]
    fn test_errors_do_not_stop_delivery_to_other_crew() {
        let stage = manual_stage();
        stage.assign(Failing);
        let recorder = stage.assign(Recorder::default());

        let result = stage.announce(DomainEvent::TestRunStarts { timestamp: ts(0) });
        assert!(matches!(result, Err(Error::ProtocolViolation { .. })));
        assert_eq!(recorder.lock().seen, vec!["TestRunStarts"]);

        // The stage stays usable after a failed delivery
        assert!(stage.announce(DomainEvent::TestRunFinishes { timestamp: ts(1) }).is_err());
        assert_eq!(recorder.lock().seen.len(), 2);
    }

    #[test]
    fn test_tracks_current_scene() {
        let stage = manual_stage();
        let scene_id = CorrelationId::new("s1");
        let details = ScenarioDetails::new("Pays", "Checkout", Default::default());

        stage
            .announce(DomainEvent::SceneStarts {
                scene_id: scene_id.clone(),
                details: details.clone(),
                retry: None,
                timestamp: ts(0),
            })
            .unwrap();
        assert_eq!(stage.current_scene_id(), Some(scene_id.clone()));

        stage
            .announce(DomainEvent::SceneFinished {
                scene_id,
                details,
                outcome: crate::model::Outcome::ExecutionSuccessful,
                timestamp: ts(5),
            })
            .unwrap();
        assert_eq!(stage.current_scene_id(), None);
    }

    #[tokio::test]
    async fn test_cue_resolves_immediately_when_nothing_is_outstanding() {
        let stage = manual_stage();
        stage.wait_for_next_cue().await.unwrap();
    }

    #[tokio::test]
    async fn test_cue_waits_for_async_completion() {
        let stage = Stage::with_clock(Arc::new(SystemClock), Duration::from_secs(2));
        let id = stage.new_correlation_id();

        stage
            .announce(DomainEvent::AsyncOperationAttempted {
                correlation_id: id.clone(),
                description: "Saving photo".to_string(),
                timestamp: stage.current_time(),
            })
            .unwrap();

        let background = stage.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background
                .announce(DomainEvent::AsyncOperationCompleted {
                    correlation_id: id,
                    timestamp: background.current_time(),
                })
                .unwrap();
        });

        stage.wait_for_next_cue().await.unwrap();
        assert!(stage.outstanding_operations().is_empty());
    }

    #[tokio::test]
    async fn test_cue_times_out_naming_outstanding_operations() {
        let stage = manual_stage();

        for (id, description) in [("op-1", "Saving photo"), ("op-2", "Uploading report")] {
            stage
                .announce(DomainEvent::AsyncOperationAttempted {
                    correlation_id: CorrelationId::new(id),
                    description: description.to_string(),
                    timestamp: ts(0),
                })
                .unwrap();
        }
        stage
            .announce(DomainEvent::AsyncOperationFailed {
                correlation_id: CorrelationId::new("op-1"),
                error: ProblemIndication::error("disk full"),
                timestamp: ts(1),
            })
            .unwrap();

        match stage.wait_for_next_cue().await {
            Err(Error::OutstandingAsyncOperations { timeout_ms, descriptions }) => {
                assert_eq!(timeout_ms, 50);
                assert_eq!(descriptions, vec!["Uploading report".to_string()]);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(stage.failed_operations().len(), 1);
    }
}
