//! Receivers assigned to a stage

use crate::error::Result;
use crate::events::DomainEvent;
use crate::stage::Stage;

/// A receiver of domain events
///
/// `notify_of` runs on the announcing caller's stack and must not block.
/// Asynchronous side effects are announced as `AsyncOperationAttempted`
/// followed by `AsyncOperationCompleted` or `AsyncOperationFailed`, which the
/// stage's drain barrier waits for.
pub trait StageCrewMember: Send {
    fn notify_of(&mut self, event: &DomainEvent, stage: &Stage) -> Result<()>;

    /// Name used in diagnostics
    fn name(&self) -> &str {
        "crew member"
    }
}
