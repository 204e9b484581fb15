//! Domain model: value objects, tags, outcomes and scene details

mod details;
mod outcome;
mod tag;
mod values;

pub use details::{
    ActivityDetails, FileSystemLocation, ParameterValue, RetryAttempt, ScenarioDetails,
    ScenarioParameters, TestSuiteDetails,
};
pub use outcome::{Outcome, OutcomeKind, ProblemIndication};
pub use tag::Tag;
pub use values::{Category, Description, Name};
