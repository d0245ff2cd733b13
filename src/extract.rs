//! Extractors handing the validated document to route handlers.
//!
//! ```ignore
//! async fn create_user(ValidatedJson(user): ValidatedJson<NewUser>) -> impl IntoResponse {
//!     // `user` was built from the document the layer validated
//! }
//! ```
use crate::errors::ValidatedRejection;
use crate::layer::ValidatedDocument;
use crate::source::{DocumentSource, JsonBody, QueryArgs};
use crate::validator::Document;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The JSON body as validated by a `validate_json` layer.
///
/// `T` defaults to the raw document; any `DeserializeOwned` type can be used instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJson<T = Document>(pub T);

/// The query arguments as validated by a `validate_args` layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArgs<T = Document>(pub T);

fn take_document<X, T>(parts: &Parts) -> Result<T, ValidatedRejection>
where
    X: DocumentSource,
    T: DeserializeOwned,
{
    let validated = parts
        .extensions
        .get::<ValidatedDocument<X>>()
        .ok_or(ValidatedRejection::Missing(X::KIND))?;
    Ok(serde_json::from_value(Value::Object(
        validated.document.clone(),
    ))?)
}

impl<S, T> FromRequestParts<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ValidatedRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        take_document::<JsonBody, T>(parts).map(ValidatedJson)
    }
}

impl<S, T> FromRequestParts<S> for ValidatedArgs<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ValidatedRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        take_document::<QueryArgs, T>(parts).map(ValidatedArgs)
    }
}
