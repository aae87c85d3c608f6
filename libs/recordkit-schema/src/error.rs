use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Schema configuration errors.
///
/// Raised while compiling a record type; fatal at startup. Every variant
/// names the dotted path of the offending key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate field `{path}`")]
    DuplicateField { path: String },

    #[error("field `{path}` must not start with `$`")]
    DollarPrefix { path: String },

    #[error("field `{path}` ends with reserved query suffix `{suffix}`")]
    ReservedSuffix { path: String, suffix: &'static str },

    #[error("top-level field `{path}` collides with a reserved query control word")]
    ReservedWord { path: String },

    #[error("lazy reference at `{path}` points to a dropped object type")]
    DanglingReference { path: String },

    #[error("schema root must be an object type")]
    RootNotObject,
}

/// One problem found in a validated input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Input rejected by a body or query validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    issues: Vec<Issue>,
}

impl ValidationError {
    /// Build from collected issues.
    ///
    /// Returns `Ok(())` when there are none, so callers can finish a
    /// validation pass with `ValidationError::check(issues)?`.
    ///
    /// # Errors
    /// Returns the error when `issues` is non-empty.
    pub fn check(issues: Vec<Issue>) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self { issues })
        }
    }

    #[must_use]
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![Issue::new(path, message)],
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed")?;
        for (i, issue) in self.issues.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Join a dotted path segment.
pub(crate) fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}.{segment}")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn check_passes_without_issues() {
        assert!(ValidationError::check(Vec::new()).is_ok());
    }

    #[test]
    fn display_lists_every_issue() {
        let err = ValidationError::check(vec![
            Issue::new("age", "expected a number"),
            Issue::new("", "unknown key `bogus`"),
        ])
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "validation failed: age: expected a number; unknown key `bogus`"
        );
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn schema_error_names_the_path() {
        let err = SchemaError::DollarPrefix {
            path: "meta.$set".to_owned(),
        };
        assert!(err.to_string().contains("meta.$set"));
    }
}
