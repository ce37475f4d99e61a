//! Timing of timed resources at the HTTP layer.
//!
//! Every timed route is wrapped by [`track`], which hands the handler a
//! [`Timed`] extractor bound to a per-request completion slot. The first
//! timed call of a request claims the slot and reports the outcome; further
//! calls in the same request run untimed. When the handler never claims the
//! slot (it skipped timing, or an extractor rejected the request first), the
//! middleware records the status of the response it passes back.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use restime_core::{Arg, HandlerFailure, HandlerReturn, ResourceCall, TimedResourceInterceptor};

use crate::error::ApiError;
use crate::mappers::ResponseMappers;

/// One timed route: its interceptor and the mappers answering its errors.
#[derive(Debug)]
pub(crate) struct TimedRoute {
    interceptor: Arc<TimedResourceInterceptor>,
    mappers: Arc<ResponseMappers>,
}

impl TimedRoute {
    pub(crate) fn new(interceptor: Arc<TimedResourceInterceptor>, mappers: Arc<ResponseMappers>) -> Self {
        Self { interceptor, mappers }
    }
}

#[derive(Debug, Clone, Default)]
struct CallSlot(Arc<AtomicBool>);

impl CallSlot {
    /// `true` for the first claim only.
    fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Timing handle of the timed resource serving the current request.
///
/// The handler runs its work through [`Timed::respond`] or
/// [`Timed::respond_async`]; the served response and the recorded status
/// come from the same classification.
#[derive(Clone, Debug)]
pub struct Timed {
    route: Arc<TimedRoute>,
    slot: CallSlot,
}

impl Timed {
    pub fn resource_path(&self) -> &str {
        self.route.interceptor.resource_path()
    }

    pub fn metric_name(&self) -> &str {
        self.route.interceptor.metric_name()
    }

    /// Run a synchronous handler body and answer with its outcome.
    pub fn respond<R, E, F>(&self, args: &[Arg<'_>], proceed: F) -> Response
    where
        R: HandlerReturn + IntoResponse,
        E: HandlerFailure,
        F: FnOnce() -> Result<R, E>,
    {
        let call = self.begin(args);
        let response = self.render(proceed());
        finish(call, &response);
        response
    }

    /// Run an async handler body and answer with its outcome. Timing starts
    /// when this is called.
    pub fn respond_async<'a, R, E, Fut>(
        &'a self,
        args: &[Arg<'_>],
        fut: Fut,
    ) -> impl Future<Output = Response> + 'a
    where
        R: HandlerReturn + IntoResponse + 'a,
        E: HandlerFailure,
        Fut: Future<Output = Result<R, E>> + 'a,
    {
        let call = self.begin(args);
        async move {
            let response = self.render(fut.await);
            finish(call, &response);
            response
        }
    }

    fn begin(&self, args: &[Arg<'_>]) -> Option<ResourceCall<'_>> {
        if self.slot.claim() {
            return Some(self.route.interceptor.begin(args));
        }
        tracing::warn!(
            resource = %self.resource_path(),
            metric = %self.metric_name(),
            "request already timed; running untimed"
        );
        None
    }

    /// Served response for a handler result. A success is answered with
    /// the status its return value classifies as (e.g. `204` for `()`).
    fn render<R, E>(&self, result: Result<R, E>) -> Response
    where
        R: HandlerReturn + IntoResponse,
        E: HandlerFailure,
    {
        match result {
            Ok(value) => {
                let status = value.returned().status();
                let mut response = value.into_response();
                if let Ok(status) = StatusCode::from_u16(status) {
                    *response.status_mut() = status;
                }
                response
            }
            Err(err) => self.route.mappers.respond(&err),
        }
    }
}

fn finish(call: Option<ResourceCall<'_>>, response: &Response) {
    if let Some(call) = call {
        call.finish(response.status().as_u16());
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Timed {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Timed>().cloned().ok_or_else(|| {
            tracing::error!(path = %parts.uri.path(), "handler expects Timed but route is not a timed resource");
            ApiError::Internal("route is not registered as a timed resource".into())
        })
    }
}

/// Middleware wrapping every timed route.
pub(crate) async fn track(State(route): State<Arc<TimedRoute>>, mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    // a merged method router may route other methods (405) through here
    let own_method = request.method().as_str() == route.interceptor.http_method();
    let slot = CallSlot::default();
    request.extensions_mut().insert(Timed {
        route: Arc::clone(&route),
        slot: slot.clone(),
    });

    let response = next.run(request).await;

    if own_method && !slot.is_claimed() {
        tracing::debug!(
            resource = %route.interceptor.resource_path(),
            method = %route.interceptor.http_method(),
            status = response.status().as_u16(),
            "timed resource answered without a timed call; recording response status"
        );
        route.interceptor.record_outcome(response.status().as_u16(), started.elapsed());
    }
    response
}
