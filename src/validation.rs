//! Validation for SQL identifiers supplied through configuration
//!
//! The rules table name is interpolated into SQL statements, so it must be a
//! plain identifier rather than a bound parameter.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A validated rules-table name
///
/// # Rules
/// - ASCII letters, digits and underscores only
/// - Must start with a letter or underscore
/// - Length: 1-63 characters
///
/// # Examples
///
/// Valid names:
/// - "casbin_rule"
/// - "_rules"
/// - "tenant42_policies"
///
/// Invalid names:
/// - "42rules" (leading digit)
/// - "casbin-rule" (hyphen)
/// - "rules; DROP TABLE x" (not an identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    const PATTERN: &'static str = r"^[A-Za-z_][A-Za-z0-9_]*$";

    /// Identifier length limit shared by common SQL engines
    const MAX_LENGTH: usize = 63;

    /// Default table, matching the Casbin database adapters
    pub const DEFAULT: &'static str = "casbin_rule";

    /// Create a validated table name
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the name is not a plain SQL identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate::validation::TableName;
    ///
    /// let table = TableName::new("casbin_rule").unwrap();
    /// assert_eq!(table.as_str(), "casbin_rule");
    ///
    /// assert!(TableName::new("casbin-rule").is_err());
    /// assert!(TableName::new("").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(TableName(name))
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Config("table name cannot be empty".to_string()));
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(Error::Config(format!(
                "table name too long (max {} characters)",
                Self::MAX_LENGTH
            )));
        }

        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(Self::PATTERN).expect("static regex is valid"));
        if !re.is_match(name) {
            return Err(Error::Config(format!(
                "table name '{}' must contain only letters, digits and underscores and not start with a digit",
                name
            )));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        TableName(Self::DEFAULT.to_string())
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(TableName::new("casbin_rule").is_ok());
        assert!(TableName::new("_rules").is_ok());
        assert!(TableName::new("Rules2").is_ok());
        assert!(TableName::new("a").is_ok());
        assert!(TableName::new("a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(TableName::new("").is_err());
        assert!(TableName::new("42rules").is_err());
        assert!(TableName::new("casbin-rule").is_err());
        assert!(TableName::new("casbin rule").is_err());
        assert!(TableName::new("rules; DROP TABLE x").is_err());
        assert!(TableName::new("\"quoted\"").is_err());
        assert!(TableName::new("a".repeat(64)).is_err());
    }

    #[test]
    fn test_default_and_display() {
        let table = TableName::default();
        assert_eq!(table.as_str(), "casbin_rule");
        assert_eq!(table.to_string(), "casbin_rule");
    }
}
