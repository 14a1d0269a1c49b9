//! The `Validator` capability: an optional, host-supplied hook for checking
//! job payloads and handler results against an application-defined schema.
//!
//! Unlike the concrete, intra-crate `Validate` trait a pipeline definition
//! uses internally, a validator here is a trait object the host registers
//! per job type — the core crate has no idea what shape a caller's job data
//! takes, so validation has to happen behind a capability boundary rather
//! than a static trait bound.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One validation failure, pointing at the offending field by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path into the payload, e.g. `"recipient.email"`. Empty when
    /// the issue applies to the payload as a whole.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn whole(message: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Result of running a validator: either the payload is acceptable, or it
/// carries one or more issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// An outcome with no issues.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// An outcome carrying a single issue.
    #[must_use]
    pub fn reject(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// An outcome carrying several issues.
    #[must_use]
    pub fn reject_all(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

/// What is being validated: a job's input payload before it runs, or a
/// handler's result before it is recorded as the job's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTarget {
    Input,
    Output,
}

/// A host-supplied check for a job type's payload or result shape.
///
/// Registered per job type alongside a `JobHandler`; a queue instance runs
/// it before invoking the handler (input) and again on the handler's
/// returned value (output) when one is registered.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Checks `value` and reports any issues found. Returning
    /// `ValidationOutcome::ok()` means the value may proceed.
    async fn validate(
        &self,
        target: ValidationTarget,
        value: &serde_json::Value,
    ) -> ValidationOutcome;
}

/// A `Validator` built from a plain synchronous closure, for callers who
/// don't need to await anything to check a payload.
pub struct FnValidator<F>(F)
where
    F: Fn(ValidationTarget, &serde_json::Value) -> ValidationOutcome + Send + Sync;

impl<F> FnValidator<F>
where
    F: Fn(ValidationTarget, &serde_json::Value) -> ValidationOutcome + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Validator for FnValidator<F>
where
    F: Fn(ValidationTarget, &serde_json::Value) -> ValidationOutcome + Send + Sync,
{
    async fn validate(
        &self,
        target: ValidationTarget,
        value: &serde_json::Value,
    ) -> ValidationOutcome {
        (self.0)(target, value)
    }
}

/// Errors surfaced by the model crate itself (as opposed to validation
/// failures, which are reported as data via `ValidationOutcome`).
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ModelError(#[from] ModelErrorKind);

#[derive(Debug, thiserror::Error)]
pub enum ModelErrorKind {
    #[error("job payload rejected: {0}")]
    JobValidationError(ValidationIssueList),
}

impl ModelError {
    #[must_use]
    pub fn job_validation(issues: Vec<ValidationIssue>) -> Self {
        Self(ModelErrorKind::JobValidationError(ValidationIssueList(
            issues,
        )))
    }
}

/// Wrapper so `Vec<ValidationIssue>` can implement `Display` for use inside
/// `ModelErrorKind`.
#[derive(Debug, Clone)]
pub struct ValidationIssueList(pub Vec<ValidationIssue>);

impl fmt::Display for ValidationIssueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_validator_reports_issue() {
        let validator = FnValidator::new(|_target, value| {
            if value.get("email").is_none() {
                ValidationOutcome::reject(ValidationIssue::new("email", "missing"))
            } else {
                ValidationOutcome::ok()
            }
        });

        let bad = serde_json::json!({});
        let outcome = validator.validate(ValidationTarget::Input, &bad).await;
        assert!(!outcome.is_valid());
        assert_eq!(outcome.issues().len(), 1);

        let good = serde_json::json!({"email": "a@b.com"});
        let outcome = validator.validate(ValidationTarget::Input, &good).await;
        assert!(outcome.is_valid());
    }

    #[test]
    fn issue_display_with_and_without_path() {
        assert_eq!(ValidationIssue::whole("bad").to_string(), "bad");
        assert_eq!(
            ValidationIssue::new("a.b", "bad").to_string(),
            "a.b: bad"
        );
    }
}
