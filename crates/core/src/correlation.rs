//! Correlation identity for scenes and activities

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;
use uuid::Uuid;

/// Opaque identifier tying related events together
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Fresh, process-unique identifier
    pub fn create() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Maps runner-native identifiers onto canonical correlation ids
///
/// Adapters key scenes by whatever the runner uses to recognise a test
/// (a Mocha full title plus file, a Cucumber pickle id). Every retry of the
/// same native key resolves to the same scene id until the key is forgotten.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    scenes: HashMap<String, CorrelationId>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical scene id for a native key, allocated on first sight
    pub fn scene_id_for(&mut self, native_key: &str) -> CorrelationId {
        if let Some(id) = self.scenes.get(native_key) {
            return id.clone();
        }

        let id = CorrelationId::create();
        trace!("Allocated scene id {} for {}", id, native_key);
        self.scenes.insert(native_key.to_string(), id.clone());
        id
    }

    /// Scene id previously allocated for a native key
    pub fn lookup(&self, native_key: &str) -> Option<&CorrelationId> {
        self.scenes.get(native_key)
    }

    /// Drop the mapping once the scene will not be retried again
    pub fn forget(&mut self, native_key: &str) -> Option<CorrelationId> {
        self.scenes.remove(native_key)
    }

    /// Activity ids are never reused
    pub fn activity_id(&self) -> CorrelationId {
        CorrelationId::create()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_is_unique() {
        let ids: HashSet<CorrelationId> = (0..1000).map(|_| CorrelationId::create()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_scene_id_is_stable_across_retries() {
        let mut registry = CorrelationRegistry::new();
        let first = registry.scene_id_for("checkout.spec.ts#pays with a card");
        let retry = registry.scene_id_for("checkout.spec.ts#pays with a card");
        let other = registry.scene_id_for("checkout.spec.ts#pays with a voucher");

        assert_eq!(first, retry);
        assert_ne!(first, other);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_forget_allocates_a_new_scene_id() {
        let mut registry = CorrelationRegistry::new();
        let first = registry.scene_id_for("a");
        assert_eq!(registry.forget("a"), Some(first.clone()));
        assert!(registry.lookup("a").is_none());
        assert_ne!(registry.scene_id_for("a"), first);
    }

    #[test]
    fn test_activity_ids_are_never_reused() {
        let registry = CorrelationRegistry::new();
        assert_ne!(registry.activity_id(), registry.activity_id());
        assert!(registry.is_empty());
    }
}
