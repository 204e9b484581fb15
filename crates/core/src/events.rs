//! Canonical domain events
//!
//! Adapters translate runner callbacks into these events and announce them
//! on the [`Stage`](crate::stage::Stage). Events are immutable; the stream is
//! append-only. On the wire each event is a JSON object tagged by `"type"`:
//!
//! ```json
//! {"type":"SceneStarts","scene_id":"s1","details":{"name":"Pays","category":"Checkout"},"timestamp":0}
//! ```

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::correlation::CorrelationId;
use crate::model::{
    ActivityDetails, Description, Name, Outcome, ProblemIndication, RetryAttempt,
    ScenarioDetails, ScenarioParameters, Tag, TestSuiteDetails,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    TestRunStarts {
        timestamp: Timestamp,
    },
    TestRunnerDetected {
        scene_id: CorrelationId,
        name: Name,
        timestamp: Timestamp,
    },
    TestSuiteStarts {
        details: TestSuiteDetails,
        timestamp: Timestamp,
    },
    TestSuiteFinished {
        details: TestSuiteDetails,
        outcome: Outcome,
        timestamp: Timestamp,
    },
    SceneSequenceDetected {
        scene_id: CorrelationId,
        /// Id shared by every scene generated from the same outline
        template_id: CorrelationId,
        details: ScenarioDetails,
        timestamp: Timestamp,
    },
    SceneParametersDetected {
        scene_id: CorrelationId,
        details: ScenarioDetails,
        parameters: ScenarioParameters,
        timestamp: Timestamp,
    },
    SceneStarts {
        scene_id: CorrelationId,
        details: ScenarioDetails,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryAttempt>,
        timestamp: Timestamp,
    },
    SceneTagged {
        scene_id: CorrelationId,
        tag: Tag,
        timestamp: Timestamp,
    },
    SceneDescriptionDetected {
        scene_id: CorrelationId,
        description: Description,
        timestamp: Timestamp,
    },
    ActivityStarts {
        scene_id: CorrelationId,
        activity_id: CorrelationId,
        details: ActivityDetails,
        timestamp: Timestamp,
    },
    ActivityFinished {
        scene_id: CorrelationId,
        activity_id: CorrelationId,
        details: ActivityDetails,
        outcome: Outcome,
        timestamp: Timestamp,
    },
    SceneFinishes {
        scene_id: CorrelationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
        timestamp: Timestamp,
    },
    SceneFinished {
        scene_id: CorrelationId,
        details: ScenarioDetails,
        outcome: Outcome,
        timestamp: Timestamp,
    },
    AsyncOperationAttempted {
        correlation_id: CorrelationId,
        description: String,
        timestamp: Timestamp,
    },
    AsyncOperationCompleted {
        correlation_id: CorrelationId,
        timestamp: Timestamp,
    },
    AsyncOperationFailed {
        correlation_id: CorrelationId,
        error: ProblemIndication,
        timestamp: Timestamp,
    },
    TestRunFinishes {
        timestamp: Timestamp,
    },
    TestRunFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Event type name, as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TestRunStarts { .. } => "TestRunStarts",
            DomainEvent::TestRunnerDetected { .. } => "TestRunnerDetected",
            DomainEvent::TestSuiteStarts { .. } => "TestSuiteStarts",
            DomainEvent::TestSuiteFinished { .. } => "TestSuiteFinished",
            DomainEvent::SceneSequenceDetected { .. } => "SceneSequenceDetected",
            DomainEvent::SceneParametersDetected { .. } => "SceneParametersDetected",
            DomainEvent::SceneStarts { .. } => "SceneStarts",
            DomainEvent::SceneTagged { .. } => "SceneTagged",
            DomainEvent::SceneDescriptionDetected { .. } => "SceneDescriptionDetected",
            DomainEvent::ActivityStarts { .. } => "ActivityStarts",
            DomainEvent::ActivityFinished { .. } => "ActivityFinished",
            DomainEvent::SceneFinishes { .. } => "SceneFinishes",
            DomainEvent::SceneFinished { .. } => "SceneFinished",
            DomainEvent::AsyncOperationAttempted { .. } => "AsyncOperationAttempted",
            DomainEvent::AsyncOperationCompleted { .. } => "AsyncOperationCompleted",
            DomainEvent::AsyncOperationFailed { .. } => "AsyncOperationFailed",
            DomainEvent::TestRunFinishes { .. } => "TestRunFinishes",
            DomainEvent::TestRunFinished { .. } => "TestRunFinished",
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::TestRunStarts { timestamp }
            | DomainEvent::TestRunnerDetected { timestamp, .. }
            | DomainEvent::TestSuiteStarts { timestamp, .. }
            | DomainEvent::TestSuiteFinished { timestamp, .. }
            | DomainEvent::SceneSequenceDetected { timestamp, .. }
            | DomainEvent::SceneParametersDetected { timestamp, .. }
            | DomainEvent::SceneStarts { timestamp, .. }
            | DomainEvent::SceneTagged { timestamp, .. }
            | DomainEvent::SceneDescriptionDetected { timestamp, .. }
            | DomainEvent::ActivityStarts { timestamp, .. }
            | DomainEvent::ActivityFinished { timestamp, .. }
            | DomainEvent::SceneFinishes { timestamp, .. }
            | DomainEvent::SceneFinished { timestamp, .. }
            | DomainEvent::AsyncOperationAttempted { timestamp, .. }
            | DomainEvent::AsyncOperationCompleted { timestamp, .. }
            | DomainEvent::AsyncOperationFailed { timestamp, .. }
            | DomainEvent::TestRunFinishes { timestamp }
            | DomainEvent::TestRunFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Scene the event belongs to, if any
    pub fn scene_id(&self) -> Option<&CorrelationId> {
        match self {
            DomainEvent::TestRunnerDetected { scene_id, .. }
            | DomainEvent::SceneSequenceDetected { scene_id, .. }
            | DomainEvent::SceneParametersDetected { scene_id, .. }
            | DomainEvent::SceneStarts { scene_id, .. }
            | DomainEvent::SceneTagged { scene_id, .. }
            | DomainEvent::SceneDescriptionDetected { scene_id, .. }
            | DomainEvent::ActivityStarts { scene_id, .. }
            | DomainEvent::ActivityFinished { scene_id, .. }
            | DomainEvent::SceneFinishes { scene_id, .. }
            | DomainEvent::SceneFinished { scene_id, .. } => Some(scene_id),
            _ => None,
        }
    }

    /// Metadata events describe a scene without moving it through its lifecycle
    pub fn is_scene_metadata(&self) -> bool {
        matches!(
            self,
            DomainEvent::TestRunnerDetected { .. }
                | DomainEvent::SceneSequenceDetected { .. }
                | DomainEvent::SceneParametersDetected { .. }
                | DomainEvent::SceneTagged { .. }
                | DomainEvent::SceneDescriptionDetected { .. }
        )
    }

    /// Short human-readable form used in diagnostics, e.g. `ActivityFinished(a1)`
    pub fn describe(&self) -> String {
        match self {
            DomainEvent::ActivityStarts { activity_id, .. }
            | DomainEvent::ActivityFinished { activity_id, .. } => {
                format!("{}({})", self.kind(), activity_id)
            }
            DomainEvent::TestSuiteStarts { details, .. }
            | DomainEvent::TestSuiteFinished { details, .. } => {
                format!("{}({})", self.kind(), details.correlation_id)
            }
            DomainEvent::AsyncOperationAttempted { correlation_id, .. }
            | DomainEvent::AsyncOperationCompleted { correlation_id, .. }
            | DomainEvent::AsyncOperationFailed { correlation_id, .. } => {
                format!("{}({})", self.kind(), correlation_id)
            }
            _ => match self.scene_id() {
                Some(scene_id) => format!("{}({})", self.kind(), scene_id),
                None => self.kind().to_string(),
            },
        }
    }
}
