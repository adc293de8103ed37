//! Request routing.
//!
//! [`Router`] maps `(method, path, body)` to an [`ApiResponse`] without any
//! knowledge of sockets, so it can be driven directly in tests;
//! [`VendstockService`] adapts it to `may_minihttp`.

mod error;
mod service;

pub use error::ApiError;
pub use service::VendstockService;

use crate::handlers::{inventory_resources, Resource};
use crate::model::validation::{json_type_name, NON_FIELD_ERRORS};
use crate::model::FieldErrors;
use crate::store::EntityStore;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub const JSON_CONTENT_TYPE: &str = "Content-Type: application/json";
pub const TEXT_CONTENT_TYPE: &str = "Content-Type: text/plain; version=0.0.4; charset=utf-8";

/// A rendered response: status code, `Content-Type` header line and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: JSON_CONTENT_TYPE,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: JSON_CONTENT_TYPE,
            body: Vec::new(),
        }
    }

    pub fn error(err: &ApiError) -> Self {
        Self::json(err.status(), &err.body())
    }

    /// Body parsed as JSON, `Value::Null` when empty or not JSON.
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Standard reason phrase for the status codes the service produces.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

enum Route<'a> {
    Health,
    Metrics,
    Collection(&'a dyn Resource),
    Item(&'a dyn Resource, i32),
    NotFound,
}

/// Dispatches requests to the mounted resources.
pub struct Router {
    store: Arc<dyn EntityStore>,
    resources: Vec<Box<dyn Resource>>,
}

impl Router {
    /// Router with the four inventory resources over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let resources = inventory_resources(store.clone());
        Self::with_resources(store, resources)
    }

    pub fn with_resources(store: Arc<dyn EntityStore>, resources: Vec<Box<dyn Resource>>) -> Self {
        Self { store, resources }
    }

    pub fn dispatch(&self, method: &str, path: &str, body: &[u8]) -> ApiResponse {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::dispatch_span(method, path).entered();

        let start = Instant::now();
        let route = self.route(path);
        let label = match &route {
            Route::Health => "health",
            Route::Metrics => "metrics",
            Route::Collection(resource) | Route::Item(resource, _) => resource.path(),
            Route::NotFound => "unknown",
        };

        let response = match self.handle(method, route, body) {
            Ok(response) => response,
            Err(err) => ApiResponse::error(&err),
        };

        log::debug!(
            "{method} {path} -> {} in {:?}",
            response.status,
            start.elapsed()
        );
        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_request(label, method, response.status, start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = label;

        response
    }

    fn route(&self, path: &str) -> Route<'_> {
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = path.trim_matches('/').split('/').filter(|s| !s.is_empty());

        let (Some(first), second, None) = (segments.next(), segments.next(), segments.next()) else {
            return Route::NotFound;
        };
        match (first, second) {
            ("health", None) => return Route::Health,
            ("metrics", None) => return Route::Metrics,
            _ => {}
        }

        let Some(resource) = self.resources.iter().find(|r| r.path() == first) else {
            return Route::NotFound;
        };
        match second {
            None => Route::Collection(resource.as_ref()),
            Some(id) => match id.parse::<i32>() {
                Ok(id) => Route::Item(resource.as_ref(), id),
                Err(_) => Route::NotFound,
            },
        }
    }

    fn handle(&self, method: &str, route: Route<'_>, body: &[u8]) -> Result<ApiResponse, ApiError> {
        let not_allowed = || ApiError::MethodNotAllowed(method.to_string());
        match route {
            Route::NotFound => Err(ApiError::NotFound),
            Route::Health => match method {
                "GET" => Ok(self.health()),
                _ => Err(not_allowed()),
            },
            Route::Metrics => match method {
                "GET" => render_metrics(),
                _ => Err(not_allowed()),
            },
            Route::Collection(resource) => match method {
                "GET" => Ok(ApiResponse::json(200, &resource.list()?)),
                "POST" => Ok(ApiResponse::json(201, &resource.create(&parse_body(body)?)?)),
                _ => Err(not_allowed()),
            },
            Route::Item(resource, id) => match method {
                "GET" => Ok(ApiResponse::json(200, &resource.retrieve(id)?)),
                "PUT" => Ok(ApiResponse::json(200, &resource.update(id, &parse_body(body)?, false)?)),
                "PATCH" => Ok(ApiResponse::json(200, &resource.update(id, &parse_body(body)?, true)?)),
                "DELETE" => {
                    resource.destroy(id)?;
                    Ok(ApiResponse::no_content())
                }
                _ => Err(not_allowed()),
            },
        }
    }

    fn health(&self) -> ApiResponse {
        match self.store.check_health() {
            Ok(()) => ApiResponse::json(200, &json!({ "status": "ok" })),
            Err(e) => {
                log::warn!("health check failed: {e}");
                ApiResponse::json(503, &json!({ "status": "unavailable" }))
            }
        }
    }
}

#[cfg(feature = "metrics")]
fn render_metrics() -> Result<ApiResponse, ApiError> {
    let body = crate::metrics::METRICS
        .render()
        .map_err(|e| ApiError::Internal(format!("could not encode metrics: {e}")))?;
    Ok(ApiResponse {
        status: 200,
        content_type: TEXT_CONTENT_TYPE,
        body,
    })
}

#[cfg(not(feature = "metrics"))]
fn render_metrics() -> Result<ApiResponse, ApiError> {
    Err(ApiError::NotFound)
}

/// Request body as a JSON object. An empty body is an empty object.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::Validation(FieldErrors::single(
            NON_FIELD_ERRORS,
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_type_name(&other)
            ),
        ))),
        Err(e) => Err(ApiError::MalformedBody(e.to_string())),
    }
}
