//! Error types for the signup wizard.

use std::collections::BTreeMap;

/// Top-level error type for the wizard service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by wizard store actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("A submission is already in progress")]
    SubmissionInFlight,

    #[error("Step {current} does not accept a {payload} payload")]
    StepMismatch { current: u32, payload: String },

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Submission aborted: {0}")]
    SubmissionAborted(String),
}

/// Failures reported by a submission endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmissionError {
    #[error("Submission rejected: {message}")]
    Rejected {
        message: String,
        errors: BTreeMap<String, String>,
    },

    #[error("Submission transport failed: {0}")]
    Transport(String),

    #[error("Submission panicked: {0}")]
    Panicked(String),
}

/// Field-scoped validation failures, keyed by field name.
///
/// Only the first violated rule per field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field` unless one is already present.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Merge another set of errors with every key prefixed by `prefix.`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, message) in other.fields {
            self.add(format!("{prefix}.{field}"), message);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    /// `Ok(value)` when no errors were recorded.
    pub fn into_result<T>(self, value: T) -> std::result::Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Result type alias for the wizard service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_field_wins() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "Email is required");
        errors.add("email", "Please enter a valid email address");
        assert_eq!(errors.get("email"), Some("Email is required"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn prefixed_merge() {
        let mut inner = ValidationErrors::new();
        inner.add("state", "Please select a valid state/province");
        let mut outer = ValidationErrors::new();
        outer.extend_prefixed("location", inner);
        assert!(outer.contains("location.state"));
        assert!(!outer.contains("state"));
    }

    #[test]
    fn display_lists_fields() {
        let mut errors = ValidationErrors::new();
        errors.add("city", "City is required");
        errors.add("address", "Address must be at least 5 characters");
        let text = errors.to_string();
        assert!(text.contains("city: City is required"));
        assert!(text.contains("address: Address must be"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut errors = ValidationErrors::new();
        errors.add("submit", "Failed to submit form. Please try again.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["submit"], "Failed to submit form. Please try again.");
    }

    #[test]
    fn into_result_passes_value_only_when_empty() {
        assert_eq!(ValidationErrors::new().into_result(7), Ok(7));

        let mut errors = ValidationErrors::new();
        errors.add("country", "Country is required");
        let rejected = errors.into_result(7).unwrap_err();
        assert_eq!(rejected.get("country"), Some("Country is required"));
    }
}
