//! Native reporter payload shapes

use serde::Serialize;

use crate::aggregate::TestStatus;
use crate::model::ProblemIndication;

/// Payload of `suite:start` / `suite:end`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuitePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub uid: String,
    pub cid: String,
    pub title: String,
    pub full_title: String,
    pub parent: String,
    pub file: String,
    pub specs: Vec<String>,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Payload of `test:*` events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub uid: String,
    pub cid: String,
    pub title: String,
    pub full_title: String,
    pub parent: String,
    pub file: String,
    pub specs: Vec<String>,
    pub pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub name: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub stack: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
}

impl From<&ProblemIndication> for ErrorPayload {
    fn from(problem: &ProblemIndication) -> Self {
        Self {
            name: problem.name.clone(),
            message: problem.message.clone(),
            kind: problem.name.clone(),
            stack: problem.stack.clone(),
            expected: problem.expected.clone(),
            actual: problem.actual.clone(),
        }
    }
}

/// Anything a reporter can be asked to emit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NativePayload {
    Suite(SuitePayload),
    Test(TestPayload),
}

impl NativePayload {
    pub fn kind(&self) -> &str {
        match self {
            NativePayload::Suite(suite) => &suite.kind,
            NativePayload::Test(test) => &test.kind,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            NativePayload::Suite(suite) => &suite.title,
            NativePayload::Test(test) => &test.title,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            NativePayload::Suite(suite) => &suite.uid,
            NativePayload::Test(test) => &test.uid,
        }
    }

    pub fn duration(&self) -> Option<u64> {
        match self {
            NativePayload::Suite(suite) => suite.duration,
            NativePayload::Test(test) => test.duration,
        }
    }
}

/// Test description handed to `beforeTest` / `afterTest`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookTest {
    pub ctx: serde_json::Value,
    pub file: String,
    pub full_name: String,
    pub full_title: String,
    pub parent: String,
    pub pending: bool,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Retries {
    pub limit: u32,
    pub attempts: u32,
}

/// Result handed to `afterTest`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookResult {
    pub passed: bool,
    pub duration: u64,
    pub retries: Retries,
    /// Error message, empty when the test passed
    pub exception: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}
