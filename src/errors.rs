//! Error types for schema construction, validation failures and extractor rejections.
//!
//! Every request-time failure collapses to the same HTTP 400 envelope:
//!
//! ```json
//! {"error": {"message": "Validation failed.", "type": "validation_failed", "details": {...}}}
//! ```
//!
//! Only the `details` member varies between failures.
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::error;

pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed.";

pub const VALIDATION_FAILED_TYPE: &str = "validation_failed";

/// A single entry in a field's error list: either a message or the errors of a nested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldError {
    Message(String),
    Nested(ValidationErrors),
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        FieldError::Message(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        FieldError::Message(message.to_owned())
    }
}

impl From<ValidationErrors> for FieldError {
    fn from(errors: ValidationErrors) -> Self {
        FieldError::Nested(errors)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Message(message) => f.write_str(message),
            FieldError::Nested(errors) => write!(f, "{{{errors}}}"),
        }
    }
}

/// Per-field validation errors, keyed by field name.
///
/// Serializes as `{"field": ["message", {"nested": ["message"]}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<FieldError>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error against a field.
    pub fn add(&mut self, field: impl Into<String>, error: impl Into<FieldError>) {
        self.0.entry(field.into()).or_default().push(error.into());
    }

    /// Record several errors against a field at once.
    pub fn extend(&mut self, field: impl Into<String>, errors: impl IntoIterator<Item = FieldError>) {
        self.0.entry(field.into()).or_default().extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// The plain messages recorded against a field, skipping nested documents.
    pub fn messages(&self, field: &str) -> Vec<&str> {
        self.get(field)
            .unwrap_or_default()
            .iter()
            .filter_map(|error| match error {
                FieldError::Message(message) => Some(message.as_str()),
                FieldError::Nested(_) => None,
            })
            .collect()
    }

    /// The errors of a nested document recorded against a field, if any.
    pub fn nested(&self, field: &str) -> Option<&ValidationErrors> {
        self.get(field)?.iter().find_map(|error| match error {
            FieldError::Nested(errors) => Some(errors),
            FieldError::Message(_) => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldError])> {
        self.0
            .iter()
            .map(|(field, errors)| (field.as_str(), errors.as_slice()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, errors)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: ")?;
            for (j, error) in errors.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{error}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A schema that the chosen validator cannot evaluate.
///
/// Reported when the validation layer is built, never at request time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("field '{field}' uses rule '{rule}' which the validator does not provide")]
    UnknownRule { field: String, rule: String },
    #[error("field '{field}' uses coercion '{coercion}' which the validator does not provide")]
    UnknownCoercion { field: String, coercion: String },
}

/// The response returned in place of the handler when a document fails validation.
#[derive(Debug, Clone)]
pub struct ValidationRejection {
    errors: ValidationErrors,
}

impl ValidationRejection {
    pub fn new(errors: ValidationErrors) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        error_response(
            StatusCode::BAD_REQUEST,
            VALIDATION_FAILED_TYPE,
            VALIDATION_FAILED_MESSAGE,
            Some(&self.errors),
        )
    }
}

/// A JSON body the validation layer could not read. The handler is never called.
#[derive(Debug, thiserror::Error)]
pub enum BodyRejection {
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Unreadable(#[source] axum::Error),
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        match self {
            BodyRejection::TooLarge { .. } => error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Request body too large.",
                None,
            ),
            BodyRejection::Unreadable(_) => {
                let mut details = ValidationErrors::new();
                details.add("body", "unreadable request body");
                error_response(
                    StatusCode::BAD_REQUEST,
                    VALIDATION_FAILED_TYPE,
                    VALIDATION_FAILED_MESSAGE,
                    Some(&details),
                )
            }
        }
    }
}

/// Failures of the `ValidatedJson` / `ValidatedArgs` extractors.
#[derive(Debug, thiserror::Error)]
pub enum ValidatedRejection {
    #[error("no validated {0} document on the request, is the validation layer attached to this route?")]
    Missing(&'static str),
    #[error("validated document does not fit the handler's type: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl IntoResponse for ValidatedRejection {
    fn into_response(self) -> Response {
        match &self {
            ValidatedRejection::Missing(_) => {
                error!(error = %self, "Handler expects a validated document");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "Failed to process request",
                    None,
                )
            }
            ValidatedRejection::Deserialize(e) => {
                let mut details = ValidationErrors::new();
                details.add("document", e.to_string());
                error_response(
                    StatusCode::BAD_REQUEST,
                    VALIDATION_FAILED_TYPE,
                    VALIDATION_FAILED_MESSAGE,
                    Some(&details),
                )
            }
        }
    }
}

fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    details: Option<&ValidationErrors>,
) -> Response {
    let mut error = json!({
        "type": error_type,
        "message": message
    });
    if let Some(details) = details {
        error["details"] = json!(details);
    }

    (status, Json(json!({ "error": error }))).into_response()
}
