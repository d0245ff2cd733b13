//! The tower layer that puts a validator in front of a route handler.
//!
//! `ValidationService` reads the document from its `DocumentSource`, runs the validator and
//! either forwards the request with the validated document in its extensions, or answers with
//! a `ValidationRejection` (or the source's own rejection) without calling the handler.
use crate::errors::{SchemaError, ValidationRejection};
use crate::schema::Schema;
use crate::source::{DocumentSource, JsonBody, QueryArgs};
use crate::validator::{Document, Validator};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// Layer validating JSON request bodies.
pub type ValidateJsonLayer<V> = ValidationLayer<V, JsonBody>;

/// Layer validating query-string arguments.
pub type ValidateArgsLayer<V> = ValidationLayer<V, QueryArgs>;

/// A document that passed validation, stored in the request extensions under its source.
pub(crate) struct ValidatedDocument<X> {
    pub(crate) document: Document,
    _source: PhantomData<fn() -> X>,
}

impl<X> ValidatedDocument<X> {
    pub(crate) fn new(document: Document) -> Self {
        Self {
            document,
            _source: PhantomData,
        }
    }
}

impl<X> Clone for ValidatedDocument<X> {
    fn clone(&self) -> Self {
        Self::new(self.document.clone())
    }
}

pub struct ValidationLayer<V, X> {
    schema: Arc<Schema>,
    validator: Arc<V>,
    source: Arc<X>,
}

impl<V: Validator, X: DocumentSource> ValidationLayer<V, X> {
    /// Build a layer, checking up front that `validator` provides every custom rule and
    /// coercion `schema` uses.
    pub fn new(schema: Schema, validator: V, source: X) -> Result<Self, SchemaError> {
        schema.check(&validator)?;
        Ok(Self {
            schema: Arc::new(schema),
            validator: Arc::new(validator),
            source: Arc::new(source),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<V> ValidationLayer<V, JsonBody> {
    /// Change the largest body the layer will buffer.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.source = Arc::new(JsonBody::with_limit(limit));
        self
    }
}

impl<V, X> Clone for ValidationLayer<V, X> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            validator: Arc::clone(&self.validator),
            source: Arc::clone(&self.source),
        }
    }
}

impl<S, V, X> Layer<S> for ValidationLayer<V, X> {
    type Service = ValidationService<S, V, X>;

    fn layer(&self, inner: S) -> Self::Service {
        ValidationService {
            inner,
            schema: Arc::clone(&self.schema),
            validator: Arc::clone(&self.validator),
            source: Arc::clone(&self.source),
        }
    }
}

pub struct ValidationService<S, V, X> {
    inner: S,
    schema: Arc<Schema>,
    validator: Arc<V>,
    source: Arc<X>,
}

impl<S: Clone, V, X> Clone for ValidationService<S, V, X> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            schema: Arc::clone(&self.schema),
            validator: Arc::clone(&self.validator),
            source: Arc::clone(&self.source),
        }
    }
}

impl<S, V, X> Service<Request> for ValidationService<S, V, X>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
    V: Validator,
    X: DocumentSource,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // The clone may not be ready; keep the service that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let schema = Arc::clone(&self.schema);
        let validator = Arc::clone(&self.validator);
        let source = Arc::clone(&self.source);

        Box::pin(async move {
            let (mut req, document) = match source.extract(req).await {
                Ok(extracted) => extracted,
                Err(rejection) => return Ok(rejection),
            };
            match validator.validate(&schema, document) {
                Ok(validated) => {
                    debug!(
                        source = X::KIND,
                        path = %req.uri().path(),
                        fields = validated.len(),
                        "Request validated"
                    );
                    req.extensions_mut()
                        .insert(ValidatedDocument::<X>::new(validated));
                    let response = inner.call(req).await?;
                    Ok(response.into_response())
                }
                Err(errors) => {
                    debug!(
                        source = X::KIND,
                        path = %req.uri().path(),
                        errors = %errors,
                        "Request failed validation"
                    );
                    Ok(ValidationRejection::new(errors).into_response())
                }
            }
        })
    }
}
