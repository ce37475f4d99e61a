//! Server modules and the binder they configure.
//!
//! A module contributes routes, timed resources, exception mappers and
//! shared instances. All modules are configured before anything is built:
//! the exception mappers are collected first, then one interceptor is built
//! per timed resource with the shared sink and mappers injected, and every
//! timed route is wrapped by the timing middleware.
//!
//! Bindings are checked before the router is assembled; a conflicting or
//! invalid binding fails the build with an error.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::sync::Arc;

use axum::handler::Handler;
use axum::http::{Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::{Extension, Router};

use restime_core::error::{RestimeError, Result};
use restime_core::{StatusClassifier, TimedResource, TimedResourceInterceptor};

use crate::app_state::AppState;
use crate::mappers::ResponseMappers;
use crate::obs::ResourceMetrics;
use crate::timed::{track, TimedRoute};

pub trait ServerModule: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn configure(&self, binder: &mut Binder);
}

type RouterLayer = Box<dyn FnOnce(Router<AppState>) -> Router<AppState> + Send>;

struct PlainRoute {
    method: Method,
    path: String,
    method_router: MethodRouter<AppState>,
}

/// Collects what modules contribute.
#[derive(Default)]
pub struct Binder {
    routes: Vec<PlainRoute>,
    timed: Vec<(TimedResource, MethodRouter<AppState>)>,
    mappers: ResponseMappers,
    provided: Vec<RouterLayer>,
    errors: Vec<RestimeError>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Untimed route served by `handler` for `method` on `path`.
    pub fn route<H, T>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        if let Some(method_router) = self.method_router(&method, path, handler) {
            self.routes.push(PlainRoute {
                method,
                path: path.to_string(),
                method_router,
            });
        }
        self
    }

    /// Timed resource served by `handler` for `resource.method` on
    /// `resource.path`. The handler receives its timing handle via
    /// [`Timed`](crate::timed::Timed).
    pub fn timed<H, T>(&mut self, resource: TimedResource, handler: H) -> &mut Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        if let Some(method_router) = self.method_router(&resource.method, &resource.path, handler) {
            self.timed.push((resource, method_router));
        }
        self
    }

    /// Answer handler errors of type `E` with `f(error)`.
    pub fn map_error<E, F, R>(&mut self, f: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.mappers.register::<E, F, R>(f);
        self
    }

    /// Answer every handler error of type `E` with `status`.
    pub fn map_error_status<E>(&mut self, status: StatusCode) -> &mut Self
    where
        E: StdError + 'static,
    {
        self.mappers.register_status::<E>(status);
        self
    }

    /// Share `value` with every handler as an `Extension<T>`.
    pub fn provide<T>(&mut self, value: T) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.provided.push(Box::new(move |router| router.layer(Extension(value))));
        self
    }

    fn method_router<H, T>(&mut self, method: &Method, path: &str, handler: H) -> Option<MethodRouter<AppState>>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        if !path.starts_with('/') {
            self.errors.push(RestimeError::InvalidConfig(format!(
                "route path must start with '/': {path:?}"
            )));
            return None;
        }
        match MethodFilter::try_from(method.clone()) {
            Ok(filter) => Some(on(filter, handler)),
            Err(_) => {
                self.errors.push(RestimeError::UnsupportedMethod(method.to_string()));
                None
            }
        }
    }

    /// Every `(method, path)` is bound once, and paths with the same shape
    /// use the same parameter names.
    fn check_bindings(&self) -> Result<()> {
        let bindings = self
            .routes
            .iter()
            .map(|r| (&r.method, &r.path))
            .chain(self.timed.iter().map(|(r, _)| (&r.method, &r.path)));

        let mut seen = HashSet::new();
        let mut shapes: HashMap<String, &String> = HashMap::new();
        for (method, path) in bindings {
            if !seen.insert((method.as_str(), path.as_str())) {
                return Err(RestimeError::DuplicateResource {
                    method: method.to_string(),
                    path: path.clone(),
                });
            }
            match shapes.entry(path_shape(path)) {
                Entry::Occupied(e) if *e.get() != path => {
                    return Err(RestimeError::InvalidConfig(format!(
                        "route {path:?} conflicts with {:?}: parameter names differ",
                        e.get()
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(e) => {
                    e.insert(path);
                }
            }
        }

        for (resource, _) in &self.timed {
            let tags = resource.params.iter().flatten().map(|t| t.tag.as_str());
            ResourceMetrics::check_tag_labels(tags).map_err(|e| match e {
                RestimeError::InvalidConfig(msg) => RestimeError::InvalidConfig(format!(
                    "{} {}: {msg}",
                    resource.method, resource.path
                )),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Build the router: one interceptor per timed resource, registered in
    /// `state`.
    pub fn into_router(mut self, state: AppState) -> Result<Router> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        self.check_bindings()?;

        tracing::debug!(mappers = ?self.mappers, "exception mappers bound");
        let mappers = Arc::new(self.mappers);
        let classifier: Arc<dyn StatusClassifier> = mappers.clone();

        let mut router = Router::new();
        for route in self.routes {
            router = router.route(&route.path, route.method_router);
        }

        for (resource, method_router) in self.timed {
            let interceptor = Arc::new(TimedResourceInterceptor::new(
                &resource,
                state.metrics(),
                Arc::clone(&classifier),
            ));
            state.register_resource(Arc::clone(&interceptor))?;
            tracing::info!(
                method = %resource.method,
                path = %resource.path,
                metric = %resource.metric_name,
                "timed resource registered"
            );
            let timed_route = Arc::new(TimedRoute::new(interceptor, Arc::clone(&mappers)));
            router = router.route(&resource.path, method_router.layer(from_fn_with_state(timed_route, track)));
        }

        for layer in self.provided {
            router = layer(router);
        }

        Ok(router.with_state(state))
    }
}

/// Path with parameter names erased: `/items/:id` -> `/items/:`.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => seg,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_shapes() {
        assert_eq!(path_shape("/v1/items/:id"), "/v1/items/:");
        assert_eq!(path_shape("/v1/items/:key"), "/v1/items/:");
        assert_eq!(path_shape("/files/*rest"), "/files/*");
        assert_eq!(path_shape("/healthz"), "/healthz");
    }
}
