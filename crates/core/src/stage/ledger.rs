//! Completion ledger for asynchronous operations announced on a stage

use tracing::{debug, warn};

use crate::correlation::CorrelationId;
use crate::events::DomainEvent;
use crate::model::ProblemIndication;

/// An operation that has been attempted but not yet completed or failed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub correlation_id: CorrelationId,
    pub description: String,
}

/// An operation that reported failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailedOperation {
    pub correlation_id: CorrelationId,
    pub description: String,
    pub error: ProblemIndication,
}

#[derive(Debug, Default)]
pub struct OperationLedger {
    outstanding: Vec<PendingOperation>,
    failed: Vec<FailedOperation>,
}

impl OperationLedger {
    /// Update the ledger from an event; returns true if the ledger changed
    pub fn track(&mut self, event: &DomainEvent) -> bool {
        match event {
            DomainEvent::AsyncOperationAttempted {
                correlation_id,
                description,
                ..
            } => {
                debug!("Async operation attempted: {} ({})", description, correlation_id);
                self.outstanding.push(PendingOperation {
                    correlation_id: correlation_id.clone(),
                    description: description.clone(),
                });
                true
            }
            DomainEvent::AsyncOperationCompleted { correlation_id, .. } => {
                match self.take(correlation_id) {
                    Some(op) => {
                        debug!("Async operation completed: {}", op.description);
                        true
                    }
                    None => {
                        warn!("Completion of unknown async operation {}", correlation_id);
                        false
                    }
                }
            }
            DomainEvent::AsyncOperationFailed {
                correlation_id,
                error,
                ..
            } => match self.take(correlation_id) {
                Some(op) => {
                    warn!("Async operation failed: {} - {}", op.description, error.message);
                    self.failed.push(FailedOperation {
                        correlation_id: op.correlation_id,
                        description: op.description,
                        error: error.clone(),
                    });
                    true
                }
                None => {
                    warn!(
                        "Failure of unknown async operation {}: {}",
                        correlation_id, error.message
                    );
                    false
                }
            },
            _ => false,
        }
    }

    fn take(&mut self, correlation_id: &CorrelationId) -> Option<PendingOperation> {
        let index = self
            .outstanding
            .iter()
            .position(|op| &op.correlation_id == correlation_id)?;
        Some(self.outstanding.remove(index))
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn outstanding(&self) -> &[PendingOperation] {
        &self.outstanding
    }

    pub fn failed(&self) -> &[FailedOperation] {
        &self.failed
    }
}
