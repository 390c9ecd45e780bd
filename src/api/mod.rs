//! HTTP surface: JSON API, graph endpoint and HTML pages.

pub mod graph;
pub mod pages;
pub mod rest;

use crate::query::QueryService;
use crate::utils::error::{ErrorCategory, EtlError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
}

impl AppState {
    pub fn new(service: QueryService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// An [`EtlError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EtlError);

impl From<EtlError> for ApiError {
    fn from(err: EtlError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EtlError::InvalidPostcode { .. }
            | EtlError::RecordNotFound { .. }
            | EtlError::BlobNotFound { .. } => StatusCode::NOT_FOUND,
            EtlError::StoreConnectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            e if e.category() == ErrorCategory::Input => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(category = ?self.0.category(), "Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        let detail = match &self.0 {
            EtlError::InvalidPostcode { .. } | EtlError::RecordNotFound { .. } => {
                self.0.to_string()
            }
            e if status.is_server_error() => e.user_friendly_message(),
            e => e.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// JSON routes, served at the root and under `/api/v1`.
fn json_routes() -> Router<AppState> {
    Router::new()
        .route("/postcodes/:code", get(rest::postcode))
        .route("/points/:point", get(rest::nearest_point))
        .route("/areas/:code", get(rest::area))
        .route("/places/:code", get(rest::place))
        .route("/hash/:prefix", get(rest::hash))
        .route("/hashes.json", post(rest::hashes))
        .route("/areatypes.json", get(rest::area_types))
        .route("/areatypes/:code", get(rest::area_type))
        .route("/search.json", get(rest::search))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/search/", get(pages::search))
        .route("/health", get(rest::health))
        .route("/graphql", post(graph::graphql))
        .merge(json_routes())
        .nest("/api/v1", json_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
