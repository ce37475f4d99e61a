//! Operational HTTP endpoints.
//!
//! - `/healthz`      : liveness
//! - `/metrics`      : Prometheus text format
//! - `/v1/resources` : registered timed resources

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::app_state::{AppState, ResourceInfo};
use crate::modules::{Binder, ServerModule};

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn resources(State(state): State<AppState>) -> Json<Vec<ResourceInfo>> {
    Json(state.resources())
}

/// Built-in module serving the endpoints above.
pub struct OpsModule;

impl ServerModule for OpsModule {
    fn name(&self) -> &'static str {
        "ops"
    }

    fn configure(&self, binder: &mut Binder) {
        binder
            .route(Method::GET, "/healthz", healthz)
            .route(Method::GET, "/metrics", metrics)
            .route(Method::GET, "/v1/resources", resources);
    }
}
