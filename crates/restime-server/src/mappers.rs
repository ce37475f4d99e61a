//! Exception mappers bound by server modules.
//!
//! A mapper turns a handler error into the response that is served; the
//! status of that response is also the status recorded for the call. The
//! table walks the error and then its `source()` chain, nearest first, and at
//! each level tries the mappers in registration order. [`ApiError`] is
//! always bound and answers with its own body.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use restime_core::{HandlerFailure, StatusClassifier};

use crate::error::{error_response, status_code_name, ApiError};

type Mapper = Box<dyn Fn(&(dyn StdError + 'static)) -> Option<Response> + Send + Sync>;

struct MapperEntry {
    error_type: &'static str,
    map: Mapper,
}

pub struct ResponseMappers {
    entries: Vec<MapperEntry>,
}

impl Default for ResponseMappers {
    fn default() -> Self {
        let mut mappers = Self { entries: Vec::new() };
        mappers.register::<ApiError, _, _>(ApiError::to_response);
        mappers
    }
}

impl ResponseMappers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer errors of type `E` with `f(error)`.
    pub fn register<E, F, T>(&mut self, f: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> T + Send + Sync + 'static,
        T: IntoResponse,
    {
        self.entries.push(MapperEntry {
            error_type: std::any::type_name::<E>(),
            map: Box::new(move |err| err.downcast_ref::<E>().map(|e| f(e).into_response())),
        });
        self
    }

    /// Answer every error of type `E` with `status` and the JSON error body.
    pub fn register_status<E>(&mut self, status: StatusCode) -> &mut Self
    where
        E: StdError + 'static,
    {
        let code = status_code_name(status);
        self.register::<E, _, _>(move |e| error_response(status, &code, e.to_string()))
    }

    /// Response of the first mapper matching `error` or one of its sources.
    pub fn find_response(&self, error: &(dyn StdError + 'static)) -> Option<Response> {
        let mut current = Some(error);
        while let Some(err) = current {
            if let Some(resp) = self.entries.iter().find_map(|e| (e.map)(err)) {
                return Some(resp);
            }
            current = err.source();
        }
        None
    }

    /// Response for a handler error.
    ///
    /// A carried status wins (a mapped body is kept, with that status);
    /// otherwise the mapped response; otherwise `500`.
    pub fn respond<E: HandlerFailure>(&self, error: &E) -> Response {
        let carried = error.carried_status().and_then(|s| StatusCode::from_u16(s).ok());
        match (carried, self.find_response(error)) {
            (Some(status), Some(mut resp)) => {
                *resp.status_mut() = status;
                resp
            }
            (Some(status), None) => error_response(status, &status_code_name(status), error.to_string()),
            (None, Some(resp)) => resp,
            (None, None) => {
                tracing::debug!(error = %error, "no exception mapper matched; answering 500");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                error_response(status, &status_code_name(status), error.to_string())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound error type names, in registration order.
    pub fn error_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.error_type)
    }
}

impl StatusClassifier for ResponseMappers {
    fn find(&self, error: &(dyn StdError + 'static)) -> Option<u16> {
        self.find_response(error).map(|r| r.status().as_u16())
    }
}

impl std::fmt::Debug for ResponseMappers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.error_types()).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    impl HandlerFailure for DiskFull {}

    #[derive(Debug, Error)]
    #[error("save failed")]
    struct SaveFailed(#[source] DiskFull);

    impl HandlerFailure for SaveFailed {}

    #[derive(Debug, Error)]
    #[error("gone")]
    struct Gone;

    impl HandlerFailure for Gone {
        fn carried_status(&self) -> Option<u16> {
            Some(410)
        }
    }

    #[test]
    fn api_error_is_bound_by_default() {
        let mappers = ResponseMappers::new();
        assert_eq!(mappers.len(), 1);
        let resp = mappers.respond(&ApiError::Conflict("x".into()));
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn source_chain_is_walked() {
        let mut mappers = ResponseMappers::new();
        mappers.register_status::<DiskFull>(StatusCode::INSUFFICIENT_STORAGE);
        let resp = mappers.respond(&SaveFailed(DiskFull));
        assert_eq!(resp.status(), StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(mappers.find(&SaveFailed(DiskFull)), Some(507));
    }

    #[test]
    fn carried_status_wins_over_mapper() {
        let mut mappers = ResponseMappers::new();
        mappers.register::<Gone, _, _>(|_| (StatusCode::BAD_GATEWAY, "mapped body"));
        assert_eq!(mappers.respond(&Gone).status(), StatusCode::GONE);
    }

    #[test]
    fn unmapped_is_500() {
        let mappers = ResponseMappers::new();
        assert_eq!(mappers.respond(&DiskFull).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mappers.find(&DiskFull), None);
    }
}
