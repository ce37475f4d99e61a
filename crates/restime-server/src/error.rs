//! Errors returned by timed HTTP handlers and the JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use restime_core::HandlerFailure;

/// Web application error: always carries its HTTP response status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn client_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> Response {
        error_response(self.status(), self.client_code(), self.to_string())
    }
}

impl HandlerFailure for ApiError {
    fn carried_status(&self) -> Option<u16> {
        Some(self.status().as_u16())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}

/// `{error, message}` JSON body with `status`.
pub fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": code,
        "message": message,
    }));
    (status, body).into_response()
}

/// `SERVICE_UNAVAILABLE` for 503; `STATUS_<n>` when there is no reason phrase.
pub fn status_code_name(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect(),
        None => format!("STATUS_{}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names() {
        assert_eq!(status_code_name(StatusCode::SERVICE_UNAVAILABLE), "SERVICE_UNAVAILABLE");
        assert_eq!(status_code_name(StatusCode::IM_A_TEAPOT), "I_M_A_TEAPOT");
        assert_eq!(status_code_name(StatusCode::from_u16(599).unwrap_or(StatusCode::OK)), "STATUS_599");
    }

    #[test]
    fn api_error_response_carries_its_status() {
        let resp = ApiError::NotFound("item 1".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
