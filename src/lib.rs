//! request-validation - schema-based request validation for axum routes
//!
//! This library attaches a schema to a route and validates either the JSON request body or the
//! query-string arguments before the handler runs. A request that fails validation never reaches
//! the handler; it gets a 400 response with a fixed envelope:
//!
//! ```json
//! {"error": {"message": "Validation failed.", "type": "validation_failed", "details": {"name": ["required field"]}}}
//! ```
//!
//! A request that passes reaches the handler, which reads the validated (and coerced) document
//! with the `ValidatedJson` or `ValidatedArgs` extractor.
//!
//! # Usage
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use request_validation::{ValidatedJson, validate_json};
//!
//! let schema = serde_json::from_value(json!({"name": {"type": "string", "required": true}}))?;
//!
//! let router = Router::new().route(
//!     "/",
//!     post(|ValidatedJson(document): ValidatedJson| async move { Json(document) })
//!         .layer(validate_json(schema)?),
//! );
//! ```
//!
//! Custom rules and coercions come from implementing `Validator` on your own type and passing it
//! to `validate_json_with` / `validate_args_with`.
use axum::Router;
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use tracing::{info, instrument};

pub mod errors;
pub mod extract;
pub mod layer;
pub mod routes;
pub mod schema;
pub mod source;
pub mod validator;

pub use errors::{
    BodyRejection, FieldError, SchemaError, ValidatedRejection, ValidationErrors,
    ValidationRejection,
};
pub use extract::{ValidatedArgs, ValidatedJson};
pub use layer::{ValidateArgsLayer, ValidateJsonLayer, ValidationLayer, ValidationService};
pub use schema::{Coercion, FieldRules, FieldType, Schema};
pub use source::{DEFAULT_BODY_LIMIT, DocumentSource, JsonBody, QueryArgs};
pub use validator::{DefaultValidator, Document, RuleContext, Validator};

/// Validate JSON request bodies against `schema` with the default validator.
pub fn validate_json(schema: Schema) -> Result<ValidateJsonLayer<DefaultValidator>, SchemaError> {
    validate_json_with(schema, DefaultValidator)
}

/// Validate JSON request bodies against `schema` with a custom validator.
pub fn validate_json_with<V: Validator>(
    schema: Schema,
    validator: V,
) -> Result<ValidateJsonLayer<V>, SchemaError> {
    ValidationLayer::new(schema, validator, JsonBody::default())
}

/// Validate query-string arguments against `schema` with the default validator.
pub fn validate_args(schema: Schema) -> Result<ValidateArgsLayer<DefaultValidator>, SchemaError> {
    validate_args_with(schema, DefaultValidator)
}

/// Validate query-string arguments against `schema` with a custom validator.
pub fn validate_args_with<V: Validator>(
    schema: Schema,
    validator: V,
) -> Result<ValidateArgsLayer<V>, SchemaError> {
    ValidationLayer::new(schema, validator, QueryArgs)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
///
/// # Parameters
/// - `prefix`: A string prefix for the metrics. The `'static` lifetime is required by the
///   Prometheus metrics layer, which keeps the prefix for the life of the program.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}
