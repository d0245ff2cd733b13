//! Where a validation layer reads its document from.
//!
//! `JsonBody` parses the request body; `QueryArgs` normalises the query string. Both hand the
//! request back so it can continue to the handler with its body intact, or answer it themselves
//! when the document cannot be read at all.
use crate::errors::BodyRejection;
use crate::validator::Document;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::form_urlencoded;

/// The largest body `JsonBody` buffers unless configured otherwise: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[async_trait]
pub trait DocumentSource: Send + Sync + 'static {
    /// Short name for logs and rejections, e.g. "json".
    const KIND: &'static str;

    /// Read the document out of `req`, returning the request to pass on, or the response to
    /// send instead of calling the handler.
    async fn extract(&self, req: Request) -> Result<(Request, Document), Response>;
}

/// Reads the document from a JSON request body.
///
/// An absent or malformed body, or one that isn't a JSON object, reads as an empty document.
/// A body over the limit is answered with 413 and one that fails to read with 400.
#[derive(Debug, Clone, Copy)]
pub struct JsonBody {
    limit: usize,
}

impl JsonBody {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for JsonBody {
    fn default() -> Self {
        Self::with_limit(DEFAULT_BODY_LIMIT)
    }
}

#[async_trait]
impl DocumentSource for JsonBody {
    const KIND: &'static str = "json";

    async fn extract(&self, req: Request) -> Result<(Request, Document), Response> {
        let (parts, body) = req.into_parts();
        let body_bytes = match Limited::new(body, self.limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(limit = self.limit, "Request body exceeds the limit");
                return Err(BodyRejection::TooLarge { limit: self.limit }.into_response());
            }
            Err(e) => {
                warn!(error = %e, "Failed to read request body");
                return Err(BodyRejection::Unreadable(axum::Error::new(e)).into_response());
            }
        };
        debug!("Received request body of size: {}", body_bytes.len());

        let document = parse_json_document(&body_bytes);
        Ok((Request::from_parts(parts, Body::from(body_bytes)), document))
    }
}

/// Parse a request body into a document, falling back to an empty one.
pub fn parse_json_document(body: &[u8]) -> Document {
    if body.is_empty() {
        return Document::new();
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(members)) => members,
        Ok(other) => {
            debug!(kind = ?other, "Request body is not a JSON object");
            Document::new()
        }
        Err(e) => {
            debug!(error = %e, "Request body is not valid JSON");
            Document::new()
        }
    }
}

/// Reads the document from the query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryArgs;

#[async_trait]
impl DocumentSource for QueryArgs {
    const KIND: &'static str = "args";

    async fn extract(&self, req: Request) -> Result<(Request, Document), Response> {
        let document = req
            .uri()
            .query()
            .map(normalize_query)
            .unwrap_or_default();
        Ok((req, document))
    }
}

/// Decode a query string into a document.
///
/// Every parameter arrives as a sequence of values. A parameter given once becomes a plain
/// string so scalar rules and coercions apply to it; one given several times stays a list.
/// Parameters with blank values are dropped.
pub fn normalize_query(query: &str) -> Document {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        grouped
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    grouped
        .into_iter()
        .map(|(name, mut values)| {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (name, value)
        })
        .collect()
}
