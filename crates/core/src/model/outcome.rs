//! Scene and activity outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error captured as part of an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemIndication {
    /// Error class, e.g. `AssertionError`
    #[serde(default = "default_error_name")]
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
}

fn default_error_name() -> String {
    "Error".to_string()
}

impl ProblemIndication {
    pub fn error(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        Self {
            stack: format!("{}: {}", name, message),
            name,
            message,
            expected: None,
            actual: None,
        }
    }

    pub fn assertion(
        message: impl Into<String>,
        expected: serde_json::Value,
        actual: serde_json::Value,
    ) -> Self {
        Self {
            expected: Some(expected),
            actual: Some(actual),
            ..Self::named("AssertionError", message)
        }
    }
}

/// Severity class of an outcome, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Successful,
    Skipped,
    Ignored,
    Pending,
    FailedWithAssertionError,
    FailedWithError,
    Compromised,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Successful => "successful",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Ignored => "ignored",
            OutcomeKind::Pending => "pending",
            OutcomeKind::FailedWithAssertionError => "failed_with_assertion_error",
            OutcomeKind::FailedWithError => "failed_with_error",
            OutcomeKind::Compromised => "compromised",
        }
    }
}

impl Default for OutcomeKind {
    fn default() -> Self {
        Self::Successful
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "successful" | "success" => Ok(OutcomeKind::Successful),
            "skipped" => Ok(OutcomeKind::Skipped),
            "ignored" => Ok(OutcomeKind::Ignored),
            "pending" => Ok(OutcomeKind::Pending),
            "failed_with_assertion_error" | "assertion_error" => {
                Ok(OutcomeKind::FailedWithAssertionError)
            }
            "failed_with_error" | "error" => Ok(OutcomeKind::FailedWithError),
            "compromised" => Ok(OutcomeKind::Compromised),
            other => Err(format!("unknown outcome kind: {}", other)),
        }
    }
}

/// Terminal result of a scene or an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    ExecutionSuccessful,
    ExecutionSkipped,
    ExecutionIgnored {
        #[serde(default)]
        error: Option<ProblemIndication>,
    },
    ImplementationPending {
        #[serde(default)]
        error: Option<ProblemIndication>,
    },
    ExecutionFailedWithAssertionError { error: ProblemIndication },
    ExecutionFailedWithError { error: ProblemIndication },
    ExecutionCompromised { error: ProblemIndication },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::ExecutionSuccessful => OutcomeKind::Successful,
            Outcome::ExecutionSkipped => OutcomeKind::Skipped,
            Outcome::ExecutionIgnored { .. } => OutcomeKind::Ignored,
            Outcome::ImplementationPending { .. } => OutcomeKind::Pending,
            Outcome::ExecutionFailedWithAssertionError { .. } => {
                OutcomeKind::FailedWithAssertionError
            }
            Outcome::ExecutionFailedWithError { .. } => OutcomeKind::FailedWithError,
            Outcome::ExecutionCompromised { .. } => OutcomeKind::Compromised,
        }
    }

    pub fn error(&self) -> Option<&ProblemIndication> {
        match self {
            Outcome::ExecutionSuccessful | Outcome::ExecutionSkipped => None,
            Outcome::ExecutionIgnored { error } | Outcome::ImplementationPending { error } => {
                error.as_ref()
            }
            Outcome::ExecutionFailedWithAssertionError { error }
            | Outcome::ExecutionFailedWithError { error }
            | Outcome::ExecutionCompromised { error } => Some(error),
        }
    }

    pub fn is_worse_than(&self, other: &Outcome) -> bool {
        self.kind() > other.kind()
    }

    pub fn failed_with_error(message: impl Into<String>) -> Self {
        Outcome::ExecutionFailedWithError {
            error: ProblemIndication::error(message),
        }
    }

    pub fn failed_with_assertion_error(
        message: impl Into<String>,
        expected: serde_json::Value,
        actual: serde_json::Value,
    ) -> Self {
        Outcome::ExecutionFailedWithAssertionError {
            error: ProblemIndication::assertion(message, expected, actual),
        }
    }

    pub fn compromised(message: impl Into<String>) -> Self {
        Outcome::ExecutionCompromised {
            error: ProblemIndication::named("TestCompromisedError", message),
        }
    }

    pub fn ignored(message: impl Into<String>) -> Self {
        Outcome::ExecutionIgnored {
            error: Some(ProblemIndication::error(message)),
        }
    }

    pub fn pending() -> Self {
        Outcome::ImplementationPending { error: None }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error() {
            Some(error) => write!(f, "{} ({})", self.kind(), error.message),
            None => write!(f, "{}", self.kind()),
        }
    }
}
