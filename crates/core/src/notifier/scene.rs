//! Per-scene state tracked by the notifier

use std::collections::HashSet;

use super::payload::Retries;
use crate::aggregate::merge_attempts;
use crate::clock::Timestamp;
use crate::correlation::CorrelationId;
use crate::model::{
    Description, Name, Outcome, OutcomeKind, RetryAttempt, ScenarioDetails, ScenarioParameters,
    Tag,
};

/// Where a scene is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePhase {
    InProgress,
    /// `SceneFinishes` seen; after-hooks may still report activities
    Finishing,
    /// An attempt finished but another may follow
    Retrying,
    Finalized,
}

/// Metadata that may arrive before the scene it describes
#[derive(Debug, Clone, PartialEq)]
pub enum SceneMetadata {
    Tagged(Tag),
    Description(Description),
    Sequence {
        template_id: CorrelationId,
        details: ScenarioDetails,
    },
    Parameters(ScenarioParameters),
    TestRunner(Name),
}

/// Where the scene was placed in the native test tree once opened
#[derive(Debug, Clone, PartialEq)]
pub struct TestNode {
    pub uid: String,
    pub title: String,
    pub parent: String,
    pub full_title: String,
    pub file: String,
}

#[derive(Debug, Clone)]
pub struct SceneState {
    pub scene_id: CorrelationId,
    pub details: ScenarioDetails,
    pub tags: Vec<Tag>,
    pub description: Option<Description>,
    pub template_id: Option<CorrelationId>,
    pub parameters: Option<ScenarioParameters>,
    pub test_runner: Option<Name>,
    pub phase: ScenePhase,
    /// Set once `test:start` has been emitted
    pub node: Option<TestNode>,
    /// Start of the first attempt
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub retry: Option<RetryAttempt>,
    /// Outcome of every finished attempt, in order
    pub attempts: Vec<Outcome>,
    /// Outcome announced by `SceneFinishes`, if any
    pub finishing_outcome: Option<Outcome>,
    pub open_activities: HashSet<CorrelationId>,
}

impl SceneState {
    pub fn new(
        scene_id: CorrelationId,
        details: ScenarioDetails,
        retry: Option<RetryAttempt>,
        started_at: Timestamp,
    ) -> Self {
        Self {
            scene_id,
            details,
            tags: Vec::new(),
            description: None,
            template_id: None,
            parameters: None,
            test_runner: None,
            phase: ScenePhase::InProgress,
            node: None,
            started_at,
            finished_at: None,
            retry,
            attempts: Vec::new(),
            finishing_outcome: None,
            open_activities: HashSet::new(),
        }
    }

    pub fn apply(&mut self, metadata: SceneMetadata) {
        match metadata {
            SceneMetadata::Tagged(tag) => {
                if !self.tags.contains(&tag) {
                    self.tags.push(tag);
                }
            }
            SceneMetadata::Description(description) => self.description = Some(description),
            SceneMetadata::Sequence { template_id, .. } => self.template_id = Some(template_id),
            SceneMetadata::Parameters(parameters) => self.parameters = Some(parameters),
            SceneMetadata::TestRunner(name) => self.test_runner = Some(name),
        }
    }

    pub fn is_opened(&self) -> bool {
        self.node.is_some()
    }

    /// Whether the scene still accepts activities and finish events
    pub fn is_running(&self) -> bool {
        matches!(self.phase, ScenePhase::InProgress | ScenePhase::Finishing)
    }

    pub fn title(&self) -> &str {
        self.details.name.value()
    }

    /// Suite titles enclosing this scene, outermost first
    ///
    /// Theme, capability and feature tags in tagging order; without a
    /// feature tag the scene's category stands in for it, unless it repeats
    /// the innermost tag.
    pub fn suite_path(&self) -> Vec<String> {
        let mut hierarchy: Vec<&Tag> = self
            .tags
            .iter()
            .filter(|tag| tag.hierarchy_level().is_some())
            .collect();
        // stable, so tagging order survives within a level
        hierarchy.sort_by_key(|tag| tag.hierarchy_level());

        let has_feature = hierarchy.iter().any(|tag| matches!(tag, Tag::Feature { .. }));

        let mut path: Vec<String> = hierarchy
            .into_iter()
            .map(|tag| tag.name().trim().to_string())
            .collect();
        let category = self.details.category.value().trim();
        if !has_feature && path.last().map(String::as_str) != Some(category) {
            path.push(category.to_string());
        }
        path.retain(|title| !title.is_empty());
        path
    }

    /// Whether a finished attempt with this outcome ends the scene
    ///
    /// Only a successful attempt or the last allowed one is terminal; any
    /// other attempt stays buffered until the runner retries it or moves on.
    pub fn is_terminal(&self, outcome: &Outcome) -> bool {
        match self.retry {
            None => true,
            Some(retry) => outcome.kind() == OutcomeKind::Successful || retry.is_last(),
        }
    }

    /// Outcome across every attempt, worst reported attempt winning
    pub fn merged_outcome(&self) -> Option<Outcome> {
        merge_attempts(&self.attempts)
    }

    pub fn retries(&self) -> Retries {
        match self.retry {
            Some(retry) => Retries {
                limit: retry.limit,
                attempts: retry.attempt,
            },
            None => Retries {
                limit: 0,
                attempts: 0,
            },
        }
    }

    /// Milliseconds from the first attempt's start to the last attempt's finish
    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .unwrap_or(self.started_at)
            .elapsed_since(self.started_at)
            .as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileSystemLocation;

    fn scene(category: &str, retry: Option<RetryAttempt>) -> SceneState {
        SceneState::new(
            CorrelationId::new("s1"),
            ScenarioDetails::new(
                "Paying with a default card",
                category,
                FileSystemLocation::new("payments/checkout.feature"),
            ),
            retry,
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn test_suite_path_falls_back_to_category() {
        assert_eq!(scene("Checkout", None).suite_path(), vec!["Checkout"]);
        assert!(scene("  ", None).suite_path().is_empty());
    }

    #[test]
    fn test_suite_path_orders_hierarchy_tags() {
        let mut state = scene("Checkout", None);
        state.apply(SceneMetadata::Tagged(Tag::feature("Card payments")));
        state.apply(SceneMetadata::Tagged(Tag::issue("JIRA-1")));
        state.apply(SceneMetadata::Tagged(Tag::theme("Payments")));
        state.apply(SceneMetadata::Tagged(Tag::capability("Checkout")));

        assert_eq!(state.suite_path(), vec!["Payments", "Checkout", "Card payments"]);
    }

    #[test]
    fn test_suite_path_without_feature_uses_category_below_capability() {
        let mut state = scene("Checkout", None);
        state.apply(SceneMetadata::Tagged(Tag::capability("Payments")));
        state.apply(SceneMetadata::Tagged(Tag::capability("Payments")));

        assert_eq!(state.tags.len(), 1);
        assert_eq!(state.suite_path(), vec!["Payments", "Checkout"]);
    }

    #[test]
    fn test_suite_path_skips_category_repeating_the_innermost_tag() {
        let mut state = scene("Checkout", None);
        state.apply(SceneMetadata::Tagged(Tag::capability("Checkout")));
        assert_eq!(state.suite_path(), vec!["Checkout"]);

        state.apply(SceneMetadata::Tagged(Tag::theme("Checkout")));
        assert_eq!(state.suite_path(), vec!["Checkout", "Checkout"]);
    }

    #[test]
    fn test_terminal_attempts() {
        let plain = scene("Checkout", None);
        assert!(plain.is_terminal(&Outcome::ignored("retrying")));

        let first = scene("Checkout", Some(RetryAttempt::new(0, 2)));
        assert!(!first.is_terminal(&Outcome::ignored("retrying")));
        assert!(first.is_terminal(&Outcome::ExecutionSuccessful));
        assert!(!first.is_terminal(&Outcome::failed_with_error("boom")));
        assert!(!first.is_terminal(&Outcome::pending()));

        let last = scene("Checkout", Some(RetryAttempt::new(2, 2)));
        assert!(last.is_terminal(&Outcome::ignored("retrying")));
        assert!(last.is_terminal(&Outcome::failed_with_error("boom")));
        assert_eq!(last.retries(), Retries { limit: 2, attempts: 2 });
    }

    #[test]
    fn test_duration_spans_all_attempts() {
        let mut state = scene("Checkout", Some(RetryAttempt::new(0, 1)));
        assert_eq!(state.duration_ms(), 0);
        state.finished_at = Some(Timestamp::from_millis(750));
        assert_eq!(state.duration_ms(), 750);
    }

    #[test]
    fn test_metadata_is_recorded() {
        let mut state = scene("Checkout", None);
        state.apply(SceneMetadata::TestRunner(Name::new("mocha")));
        state.apply(SceneMetadata::Description(Description::new("Cards on file")));
        state.apply(SceneMetadata::Parameters(ScenarioParameters::default()));

        assert_eq!(state.test_runner, Some(Name::new("mocha")));
        assert_eq!(state.description.as_ref().map(|d| d.value()), Some("Cards on file"));
        assert!(state.parameters.is_some());
        assert!(!state.is_opened());
        assert!(state.is_running());
    }
}
