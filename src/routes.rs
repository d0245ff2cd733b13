//! Routes declared in a JSON routes file, each serving a validating echo endpoint.
//!
//! ```json
//! {
//!   "routes": [
//!     {"path": "/users", "method": "POST", "source": "json",
//!      "schema": {"name": {"type": "string", "required": true}}},
//!     {"path": "/search", "method": "GET", "source": "args",
//!      "schema": {"q": {"type": "string", "required": true}}, "allow_unknown": true}
//!   ]
//! }
//! ```
//!
//! A route that passes validation answers `{"status": "ok", "data": <validated document>}`.
use crate::extract::{ValidatedArgs, ValidatedJson};
use crate::schema::Schema;
use crate::{validate_args, validate_json};
use anyhow::{Context as _, anyhow, bail};
use axum::routing::{MethodFilter, MethodRouter, on};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    fn filter(self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Which part of the request a route validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Json,
    Args,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    pub method: HttpMethod,
    pub source: Source,
    pub schema: Schema,
    #[serde(default)]
    pub allow_unknown: bool,
}

/// The routes file contains a list of routes.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesFile {
    pub routes: Vec<RouteSpec>,
}

impl RoutesFile {
    pub async fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read routes file {}: {}", path.display(), e))?;

        let routes: RoutesFile = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse routes file {}: {}", path.display(), e))?;

        info!(
            "Loaded {} routes from {}",
            routes.routes.len(),
            path.display()
        );
        Ok(routes)
    }
}

async fn echo_json(ValidatedJson(document): ValidatedJson) -> Json<Value> {
    Json(json!({ "status": "ok", "data": document }))
}

async fn echo_args(ValidatedArgs(document): ValidatedArgs) -> Json<Value> {
    Json(json!({ "status": "ok", "data": document }))
}

/// Build a router serving every route in `routes`.
///
/// Fails if a `(path, method)` pair appears twice or a schema uses rules the default
/// validator doesn't provide.
#[instrument(skip(routes))]
pub fn build_router(routes: &RoutesFile, body_limit: usize) -> Result<Router, anyhow::Error> {
    info!("Building router");
    let mut seen = HashSet::new();
    let mut by_path: BTreeMap<&str, MethodRouter> = BTreeMap::new();

    for route in &routes.routes {
        if !seen.insert((route.path.as_str(), route.method)) {
            bail!("Duplicate route {} {}", route.method, route.path);
        }

        let schema = route.schema.clone().allow_unknown(route.allow_unknown);
        let context = || format!("Invalid schema for {} {}", route.method, route.path);
        let method_router = match route.source {
            Source::Json => on(route.method.filter(), echo_json).layer(
                validate_json(schema)
                    .with_context(context)?
                    .with_limit(body_limit),
            ),
            Source::Args => on(route.method.filter(), echo_args)
                .layer(validate_args(schema).with_context(context)?),
        };
        debug!(method = %route.method, path = %route.path, source = ?route.source, "Adding route");

        let merged = match by_path.remove(route.path.as_str()) {
            Some(existing) => existing.merge(method_router),
            None => method_router,
        };
        by_path.insert(route.path.as_str(), merged);
    }

    Ok(by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use crate::source::DEFAULT_BODY_LIMIT;

    fn routes(value: Value) -> RoutesFile {
        serde_json::from_value(value).unwrap()
    }

    fn users_and_search() -> RoutesFile {
        routes(json!({
            "routes": [
                {
                    "path": "/users",
                    "method": "POST",
                    "source": "json",
                    "schema": {"name": {"type": "string", "required": true}}
                },
                {
                    "path": "/users",
                    "method": "get",
                    "source": "args",
                    "schema": {"page": {"type": "integer", "coerce": "integer", "default": 1}}
                },
                {
                    "path": "/search",
                    "method": "GET",
                    "source": "args",
                    "schema": {"q": {"type": "string", "required": true}},
                    "allow_unknown": true
                }
            ]
        }))
    }

    #[tokio::test]
    async fn test_json_route_echoes_validated_document() {
        let router = build_router(&users_and_search(), DEFAULT_BODY_LIMIT).unwrap();
        let server = TestServer::new(router).unwrap();

        let response = server.post("/users").json(&json!({"name": "john"})).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "ok", "data": {"name": "john"}})
        );

        let response = server.post("/users").json(&json!({})).await;
        assert_eq!(response.status_code(), 400);
        assert_eq!(
            response.json::<Value>()["error"]["details"]["name"][0],
            "required field"
        );
    }

    #[tokio::test]
    async fn test_same_path_serves_both_methods() {
        let router = build_router(&users_and_search(), DEFAULT_BODY_LIMIT).unwrap();
        let server = TestServer::new(router).unwrap();

        let response = server.get("/users").add_query_param("page", "3").await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.json::<Value>()["data"], json!({"page": 3}));

        let response = server.get("/users").await;
        assert_eq!(response.json::<Value>()["data"], json!({"page": 1}));
    }

    #[tokio::test]
    async fn test_allow_unknown_is_per_route() {
        let router = build_router(&users_and_search(), DEFAULT_BODY_LIMIT).unwrap();
        let server = TestServer::new(router).unwrap();

        let response = server
            .get("/search")
            .add_query_param("q", "rust")
            .add_query_param("lang", "en")
            .await;
        assert_eq!(response.status_code(), 200);

        let response = server
            .get("/users")
            .add_query_param("lang", "en")
            .await;
        assert_eq!(response.status_code(), 400);
    }

    #[test]
    fn test_duplicate_routes_are_rejected() {
        let routes = routes(json!({
            "routes": [
                {"path": "/", "method": "POST", "source": "json", "schema": {}},
                {"path": "/", "method": "post", "source": "args", "schema": {}}
            ]
        }));

        let error = build_router(&routes, DEFAULT_BODY_LIMIT).unwrap_err();
        assert!(error.to_string().contains("Duplicate route POST /"));
    }

    #[test]
    fn test_unknown_rules_fail_the_build() {
        let routes = routes(json!({
            "routes": [{
                "path": "/",
                "method": "POST",
                "source": "json",
                "schema": {"reversed": {"type": "string", "reversed_string": "name"}}
            }]
        }));

        let error = build_router(&routes, DEFAULT_BODY_LIMIT).unwrap_err();
        assert!(error.to_string().contains("Invalid schema for POST /"));
    }

    #[tokio::test]
    async fn test_routes_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "request-validation-routes-{}.json",
            std::process::id()
        ));
        tokio::fs::write(
            &path,
            serde_json::to_vec(&json!({
                "routes": [{"path": "/", "method": "POST", "source": "json", "schema": {}}]
            }))
            .unwrap(),
        )
        .await
        .unwrap();

        let routes = RoutesFile::from_file(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(routes.routes.len(), 1);
        assert_eq!(routes.routes[0].method, HttpMethod::Post);
        assert_eq!(routes.routes[0].source, Source::Json);
    }

    #[tokio::test]
    async fn test_missing_routes_file() {
        let error = RoutesFile::from_file(Path::new("/nonexistent/routes.json"))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Failed to read routes file"));
    }
}
