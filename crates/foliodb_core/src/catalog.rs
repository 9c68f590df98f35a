//! Naming rules and catalog info types for scopes and collections.

use crate::error::{Error, Result};

/// Name of the default scope present in every database.
pub const DEFAULT_SCOPE: &str = "_default";

/// Name of the default collection present in the default scope.
pub const DEFAULT_COLLECTION: &str = "_default";

/// Maximum length for scope and collection names.
const MAX_NAME_LEN: usize = 251;

/// Information about a scope and the collections it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    /// Scope name.
    pub name: String,
    /// Names of the collections within the scope.
    pub collections: Vec<String>,
}

/// Validates a scope or collection name.
///
/// Names must be non-empty, at most 251 characters, start with a letter or
/// digit, and contain only letters, digits, `-`, `_`, or `%`. The reserved
/// `_default` name is the one exception to the leading-character rule.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name == DEFAULT_SCOPE {
        return Ok(());
    }
    if name.is_empty() {
        return Err(Error::invalid_argument(format!("{kind} name is empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_argument(format!(
            "{kind} name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !first.is_ascii_alphanumeric() {
        return Err(Error::invalid_argument(format!(
            "{kind} name must start with a letter or digit: {name:?}"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '%'))
    {
        return Err(Error::invalid_argument(format!(
            "{kind} name contains invalid character {bad:?}: {name:?}"
        )));
    }
    Ok(())
}

/// Builds the fully-qualified `scope.collection` display name.
#[must_use]
pub(crate) fn qualified_name(scope: &str, collection: &str) -> String {
    format!("{scope}.{collection}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_are_valid() {
        validate_name("scope", DEFAULT_SCOPE).unwrap();
        validate_name("collection", DEFAULT_COLLECTION).unwrap();
    }

    #[test]
    fn ordinary_names_are_valid() {
        validate_name("collection", "widgets").unwrap();
        validate_name("collection", "widgets-2024_a%b").unwrap();
        validate_name("scope", "9lives").unwrap();
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(validate_name("collection", "").is_err());
        assert!(validate_name("collection", "_starts_underscore").is_err());
        assert!(validate_name("collection", "has space").is_err());
        assert!(validate_name("collection", "has.dot").is_err());
        assert!(validate_name("collection", &"x".repeat(300)).is_err());
    }

    #[test]
    fn qualified_display() {
        assert_eq!(qualified_name("_default", "widgets"), "_default.widgets");
    }
}
