//! Stagehand Core Library
//!
//! Test-lifecycle event bus, correlation and native reporter translation
//! for Screenplay-style test runs.

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod error;
pub mod events;
pub mod model;
pub mod notifier;
pub mod stage;

// Re-export commonly used types
pub use aggregate::{RunSummary, SceneLedger, SceneRecord, TestStatus};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{NotifierConfig, StageConfig, StagehandConfig};
pub use correlation::{CorrelationId, CorrelationRegistry};
pub use error::{Error, Result};
pub use events::DomainEvent;
pub use notifier::{JsonLinesReporter, LifecycleHooks, Notifier, RecordingReporter, Reporter};
pub use stage::{Stage, StageCrewMember};

/// Stagehand version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "stagehand.toml";
