//! Suite tree tracking
//!
//! Two kinds of suites share one stack. Explicit suites come from
//! `TestSuiteStarts` / `TestSuiteFinished` and are opened and closed exactly
//! when the runner says so. Derived suites are reconciled from each scene's
//! suite path (theme, capability, feature, or category) and get
//! content-addressed uids so the same path always yields the same uid.

use sha2::{Digest, Sha256};

use crate::clock::Timestamp;
use crate::correlation::CorrelationId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteOrigin {
    Explicit,
    Derived,
}

/// An open suite
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteFrame {
    pub uid: String,
    pub title: String,
    /// Title of the enclosing suite, empty at the root
    pub parent: String,
    pub full_title: String,
    pub file: String,
    pub origin: SuiteOrigin,
    pub started_at: Timestamp,
    /// Latest `SceneFinished` observed while this suite was open
    pub last_finished_at: Option<Timestamp>,
}

impl SuiteFrame {
    /// Milliseconds between opening and `finished_at`, saturating at zero
    pub fn duration_until(&self, finished_at: Timestamp) -> u64 {
        finished_at.elapsed_since(self.started_at).as_millis() as u64
    }
}

/// A change to the suite tree the notifier has to report
#[derive(Debug, Clone, PartialEq)]
pub enum SuiteTransition {
    Opened(SuiteFrame),
    Closed {
        frame: SuiteFrame,
        finished_at: Timestamp,
    },
}

/// Uid for a derived suite: `suite-` plus the first 12 hex chars of
/// SHA-256 over the parent uid and the title
pub fn derived_uid(parent_uid: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_uid.as_bytes());
    hasher.update([0u8]);
    hasher.update(title.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("suite-{}", &digest[..12])
}

fn join_title(parent_full_title: Option<&str>, title: &str) -> String {
    match parent_full_title {
        Some(parent) if !parent.is_empty() => format!("{} {}", parent, title),
        _ => title.to_string(),
    }
}

/// Open suites, outermost first
#[derive(Debug, Default)]
pub struct SuiteStack {
    frames: Vec<SuiteFrame>,
}

impl SuiteStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn innermost(&self) -> Option<&SuiteFrame> {
        self.frames.last()
    }

    pub fn has_explicit(&self) -> bool {
        self.frames.iter().any(|f| f.origin == SuiteOrigin::Explicit)
    }

    /// Title joined with every enclosing suite title
    pub fn full_title_of(&self, title: &str) -> String {
        join_title(self.innermost().map(|f| f.full_title.as_str()), title)
    }

    /// Remember that a scene finished inside every open suite
    pub fn record_scene_finished(&mut self, at: Timestamp) {
        for frame in &mut self.frames {
            frame.last_finished_at = Some(match frame.last_finished_at {
                Some(previous) if previous > at => previous,
                _ => at,
            });
        }
    }

    /// Bring the derived suites in line with a scene's suite path
    ///
    /// Frames that are not on the path are closed innermost first, then the
    /// missing ones are opened outermost first. Nothing changes while an
    /// explicit suite is open.
    pub fn reconcile(
        &mut self,
        path: &[String],
        file: &str,
        at: Timestamp,
    ) -> Vec<SuiteTransition> {
        if self.has_explicit() {
            return Vec::new();
        }

        let common = self
            .frames
            .iter()
            .zip(path)
            .take_while(|(frame, title)| frame.title == **title)
            .count();

        let mut transitions = Vec::new();
        while self.frames.len() > common {
            if let Some(frame) = self.frames.pop() {
                transitions.push(Self::closed(frame, at));
            }
        }

        for title in &path[common..] {
            let parent = self.innermost();
            let frame = SuiteFrame {
                uid: derived_uid(parent.map(|p| p.uid.as_str()).unwrap_or(""), title),
                title: title.clone(),
                parent: parent.map(|p| p.title.clone()).unwrap_or_default(),
                full_title: join_title(parent.map(|p| p.full_title.as_str()), title),
                file: file.to_string(),
                origin: SuiteOrigin::Derived,
                started_at: at,
                last_finished_at: None,
            };
            self.frames.push(frame.clone());
            transitions.push(SuiteTransition::Opened(frame));
        }

        transitions
    }

    /// Open a suite the runner reported explicitly; its uid is the suite's correlation id
    pub fn open_explicit(
        &mut self,
        correlation_id: &CorrelationId,
        title: &str,
        file: &str,
        at: Timestamp,
    ) -> SuiteTransition {
        let parent = self.innermost();
        let file = if file.is_empty() {
            parent.map(|p| p.file.clone()).unwrap_or_default()
        } else {
            file.to_string()
        };

        let frame = SuiteFrame {
            uid: correlation_id.value().to_string(),
            title: title.to_string(),
            parent: parent.map(|p| p.title.clone()).unwrap_or_default(),
            full_title: join_title(parent.map(|p| p.full_title.as_str()), title),
            file,
            origin: SuiteOrigin::Explicit,
            started_at: at,
            last_finished_at: None,
        };
        self.frames.push(frame.clone());
        SuiteTransition::Opened(frame)
    }

    /// Close the innermost explicit suite, which must be `correlation_id`
    ///
    /// Derived frames nested inside it are closed first.
    pub fn close_explicit(
        &mut self,
        correlation_id: &CorrelationId,
        event: &str,
        at: Timestamp,
    ) -> Result<Vec<SuiteTransition>> {
        let innermost_explicit = self
            .frames
            .iter()
            .rposition(|f| f.origin == SuiteOrigin::Explicit);

        let index = match innermost_explicit {
            Some(index) if self.frames[index].uid == correlation_id.value() => index,
            Some(index) => {
                return Err(Error::protocol(
                    event,
                    format!("TestSuiteFinished({})", self.frames[index].uid),
                ))
            }
            None => {
                return Err(Error::protocol(
                    event,
                    format!("TestSuiteStarts({})", correlation_id),
                ))
            }
        };

        let mut transitions = Vec::new();
        while self.frames.len() > index + 1 {
            if let Some(frame) = self.frames.pop() {
                transitions.push(Self::closed(frame, at));
            }
        }
        if let Some(frame) = self.frames.pop() {
            transitions.push(SuiteTransition::Closed {
                frame,
                finished_at: at,
            });
        }
        Ok(transitions)
    }

    /// Close every open suite, innermost first
    pub fn close_all(&mut self, at: Timestamp) -> Vec<SuiteTransition> {
        let mut transitions = Vec::new();
        while let Some(frame) = self.frames.pop() {
            transitions.push(Self::closed(frame, at));
        }
        transitions
    }

    fn closed(frame: SuiteFrame, at: Timestamp) -> SuiteTransition {
        let finished_at = match frame.origin {
            SuiteOrigin::Derived => frame.last_finished_at.unwrap_or(at),
            SuiteOrigin::Explicit => at,
        };
        SuiteTransition::Closed { frame, finished_at }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn id(value: &str) -> CorrelationId {
        CorrelationId::new(value)
    }

    fn path(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|t| t.to_string()).collect()
    }

    fn summary(transitions: &[SuiteTransition]) -> Vec<String> {
        transitions
            .iter()
            .map(|t| match t {
                SuiteTransition::Opened(frame) => format!("open {}", frame.title),
                SuiteTransition::Closed { frame, .. } => format!("close {}", frame.title),
            })
            .collect()
    }

    #[test]
    fn test_derived_uid_is_content_addressed() {
        let uid = derived_uid("", "Checkout");
        assert!(uid.starts_with("suite-"));
        assert_eq!(uid.len(), "suite-".len() + 12);
        assert_eq!(uid, derived_uid("", "Checkout"));
        assert_ne!(uid, derived_uid("suite-000000000000", "Checkout"));
        assert_ne!(uid, derived_uid("", "Payments"));
    }

    #[test]
    fn test_reconcile_closes_siblings_before_opening() {
        let mut stack = SuiteStack::new();
        let first = stack.reconcile(&path(&["A", "B"]), "a.feature", at(0));
        assert_eq!(summary(&first), vec!["open A", "open B"]);

        let second = stack.reconcile(&path(&["A", "C"]), "a.feature", at(10));
        assert_eq!(summary(&second), vec!["close B", "open C"]);

        let innermost = stack.innermost().unwrap();
        assert_eq!(innermost.parent, "A");
        assert_eq!(innermost.full_title, "A C");
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_derived_suite_ends_at_last_finished_scene() {
        let mut stack = SuiteStack::new();
        stack.reconcile(&path(&["A"]), "a.feature", at(100));
        stack.record_scene_finished(at(400));

        let closed = stack.reconcile(&path(&["B"]), "b.feature", at(900));
        match &closed[0] {
            SuiteTransition::Closed { frame, finished_at } => {
                assert_eq!(*finished_at, at(400));
                assert_eq!(frame.duration_until(*finished_at), 300);
            }
            other => panic!("unexpected transition {:?}", other),
        }
    }

    #[test]
    fn test_duration_saturates_at_zero() {
        let mut stack = SuiteStack::new();
        stack.reconcile(&path(&["A"]), "a.feature", at(100));
        let frame = stack.innermost().unwrap();
        assert_eq!(frame.duration_until(at(50)), 0);
    }

    #[test]
    fn test_explicit_suites_nest_and_suppress_reconciliation() {
        let mut stack = SuiteStack::new();
        stack.open_explicit(&id("suite-0"), "Checkout", "payments/checkout.feature", at(0));
        stack.open_explicit(&id("suite-1"), "Credit card payment", "", at(0));

        let inner = stack.innermost().unwrap();
        assert_eq!(inner.full_title, "Checkout Credit card payment");
        assert_eq!(inner.parent, "Checkout");
        assert_eq!(inner.file, "payments/checkout.feature");

        assert!(stack.reconcile(&path(&["Other"]), "other.feature", at(10)).is_empty());

        let closed = stack
            .close_explicit(&id("suite-1"), "TestSuiteFinished(suite-1)", at(500))
            .unwrap();
        assert_eq!(summary(&closed), vec!["close Credit card payment"]);
    }

    #[test]
    fn test_mismatched_explicit_close_is_a_violation() {
        let mut stack = SuiteStack::new();
        stack.open_explicit(&id("suite-0"), "Checkout", "", at(0));
        stack.open_explicit(&id("suite-1"), "Card", "", at(0));

        let err = stack
            .close_explicit(&id("suite-0"), "TestSuiteFinished(suite-0)", at(5))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("TestSuiteFinished(suite-1)"));

        let mut empty = SuiteStack::new();
        assert!(empty.close_explicit(&id("x"), "TestSuiteFinished(x)", at(5)).is_err());
    }

    #[test]
    fn test_close_explicit_closes_nested_derived_frames_first() {
        let mut stack = SuiteStack::new();
        stack.open_explicit(&id("suite-0"), "Checkout", "", at(0));
        // derived frames can only sit above an explicit one if they were opened first
        stack.frames.push(SuiteFrame {
            uid: derived_uid("suite-0", "Cards"),
            title: "Cards".to_string(),
            parent: "Checkout".to_string(),
            full_title: "Checkout Cards".to_string(),
            file: String::new(),
            origin: SuiteOrigin::Derived,
            started_at: at(0),
            last_finished_at: None,
        });

        let closed = stack
            .close_explicit(&id("suite-0"), "TestSuiteFinished(suite-0)", at(5))
            .unwrap();
        assert_eq!(summary(&closed), vec!["close Cards", "close Checkout"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_close_all_is_innermost_first() {
        let mut stack = SuiteStack::new();
        stack.reconcile(&path(&["Theme", "Capability", "Feature"]), "f.feature", at(0));
        let closed = stack.close_all(at(10));
        assert_eq!(summary(&closed), vec!["close Feature", "close Capability", "close Theme"]);
    }
}
