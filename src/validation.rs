// Input validation shared by request payloads and query parameters

use serde::Serialize;
use thiserror::Error;

/// One rejected field and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error: {}", summary(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn summary(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.field, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }
}

/// Collects issues while a payload is checked field by field.
#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<FieldIssue>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.issues.push(FieldIssue {
                field: field.to_string(),
                message: message.to_string(),
            });
        }
        self
    }

    pub fn min_len(&mut self, value: &str, min: usize, field: &str, message: &str) -> &mut Self {
        self.check(value.chars().count() >= min, field, message)
    }

    pub fn finish(&mut self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                issues: std::mem::take(&mut self.issues),
            })
        }
    }
}
