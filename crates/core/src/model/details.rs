//! Details describing scenes, activities and suites

use serde::{Deserialize, Serialize};

use super::{Category, Description, Name};
use crate::correlation::CorrelationId;

/// Where a scene, activity or suite was declared
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileSystemLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl FileSystemLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
            column: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// Identifies a scene to people: its name, category and declaration site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDetails {
    pub name: Name,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub location: FileSystemLocation,
}

impl ScenarioDetails {
    pub fn new(
        name: impl Into<Name>,
        category: impl Into<Category>,
        location: FileSystemLocation,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDetails {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<FileSystemLocation>,
}

impl ActivityDetails {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }
}

/// A suite the runner reported explicitly (Mocha `describe`, Jasmine suite)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuiteDetails {
    pub name: Name,
    #[serde(default)]
    pub location: FileSystemLocation,
    pub correlation_id: CorrelationId,
}

/// One example row value used to instantiate an outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: String,
}

/// Example row a concrete scene was generated from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioParameters {
    #[serde(default)]
    pub name: Name,
    #[serde(default)]
    pub description: Description,
    /// Parameter values in column order
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

impl ScenarioParameters {
    pub fn value_of(&self, parameter: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.name == parameter)
            .map(|v| v.value.as_str())
    }
}

/// Retry metadata the runner attaches to each attempt of a retryable scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-based attempt number
    pub attempt: u32,
    /// Maximum number of retries after the first attempt
    pub limit: u32,
}

impl RetryAttempt {
    pub fn new(attempt: u32, limit: u32) -> Self {
        Self { attempt, limit }
    }

    /// No further attempt will follow this one
    pub fn is_last(&self) -> bool {
        self.attempt >= self.limit
    }
}
