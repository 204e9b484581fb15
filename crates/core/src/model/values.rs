//! String value objects with value-based equality

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! value_object {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn value(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

value_object!(
    /// Name of a scene, activity, suite or test runner
    Name
);

value_object!(
    /// Free-form description of a scene or an examples table
    Description
);

value_object!(
    /// Grouping a scene belongs to, typically the feature or spec file title
    Category
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_value() {
        assert_eq!(Name::new("Checkout"), Name::from("Checkout".to_string()));
        assert_ne!(Name::new("Checkout"), Name::new("checkout"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&Category::new("Payments")).unwrap();
        assert_eq!(json, "\"Payments\"");
        assert!(Description::new("  ").is_empty());
    }
}
