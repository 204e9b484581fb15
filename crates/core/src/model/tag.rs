//! Scene tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag attached to a scene
///
/// Feature, capability and theme tags also describe where the scene sits in
/// the suite hierarchy; the remaining variants are descriptive only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tag {
    Feature { name: String },
    Capability { name: String },
    Theme { name: String },
    Manual { name: String },
    Issue { name: String },
    Browser { name: String },
    Platform { name: String },
    Arbitrary { name: String },
}

impl Tag {
    pub fn feature(name: impl Into<String>) -> Self {
        Tag::Feature { name: name.into() }
    }

    pub fn capability(name: impl Into<String>) -> Self {
        Tag::Capability { name: name.into() }
    }

    pub fn theme(name: impl Into<String>) -> Self {
        Tag::Theme { name: name.into() }
    }

    pub fn issue(name: impl Into<String>) -> Self {
        Tag::Issue { name: name.into() }
    }

    pub fn arbitrary(name: impl Into<String>) -> Self {
        Tag::Arbitrary { name: name.into() }
    }

    /// Type discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Tag::Feature { .. } => "feature",
            Tag::Capability { .. } => "capability",
            Tag::Theme { .. } => "theme",
            Tag::Manual { .. } => "manual",
            Tag::Issue { .. } => "issue",
            Tag::Browser { .. } => "browser",
            Tag::Platform { .. } => "platform",
            Tag::Arbitrary { .. } => "tag",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Feature { name }
            | Tag::Capability { name }
            | Tag::Theme { name }
            | Tag::Manual { name }
            | Tag::Issue { name }
            | Tag::Browser { name }
            | Tag::Platform { name }
            | Tag::Arbitrary { name } => name,
        }
    }

    /// Rank in the suite hierarchy, outermost first; `None` for descriptive tags
    pub fn hierarchy_level(&self) -> Option<u8> {
        match self {
            Tag::Theme { .. } => Some(0),
            Tag::Capability { .. } => Some(1),
            Tag::Feature { .. } => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_wire_format() {
        let tag: Tag = serde_json::from_str(r#"{"type":"feature","name":"Checkout"}"#).unwrap();
        assert_eq!(tag, Tag::feature("Checkout"));
        assert_eq!(tag.kind(), "feature");
        assert_eq!(tag.to_string(), "feature:Checkout");
    }

    #[test]
    fn test_hierarchy_levels() {
        assert!(Tag::theme("t").hierarchy_level() < Tag::capability("c").hierarchy_level());
        assert!(Tag::capability("c").hierarchy_level() < Tag::feature("f").hierarchy_level());
        assert_eq!(Tag::issue("JIRA-1").hierarchy_level(), None);
    }
}
