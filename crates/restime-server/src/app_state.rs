//! Shared application state for restime-server.
//!
//! Holds the config, the resource metrics registry (the interceptors' sink)
//! and the registered timed resources.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use restime_core::error::{RestimeError, Result};
use restime_core::TimedResourceInterceptor;

use crate::config::ServerConfig;
use crate::obs::ResourceMetrics;

/// `(method, path)`.
type ResourceId = (String, String);

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ServerConfig,
    metrics: Arc<ResourceMetrics>,
    resources: DashMap<ResourceId, Arc<TimedResourceInterceptor>>,
}

/// Public view of one registered timed resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub method: String,
    pub path: String,
    pub metric: String,
    pub tags: Vec<String>,
}

impl AppState {
    pub fn new(cfg: ServerConfig) -> Self {
        let metrics = Arc::new(ResourceMetrics::new(cfg.metrics.namespace.clone()));
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                resources: DashMap::new(),
            }),
        }
    }

    pub fn cfg(&self) -> &ServerConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<ResourceMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Register an interceptor; one per `(method, path)`.
    pub(crate) fn register_resource(&self, interceptor: Arc<TimedResourceInterceptor>) -> Result<()> {
        let id = (interceptor.http_method().to_string(), interceptor.resource_path().to_string());
        match self.inner.resources.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(RestimeError::DuplicateResource {
                method: e.key().0.clone(),
                path: e.key().1.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(interceptor);
                Ok(())
            }
        }
    }

    pub fn resource(&self, method: &str, path: &str) -> Option<Arc<TimedResourceInterceptor>> {
        self.inner
            .resources
            .get(&(method.to_string(), path.to_string()))
            .map(|r| Arc::clone(r.value()))
    }

    /// Registered resources ordered by path, then method.
    pub fn resources(&self) -> Vec<ResourceInfo> {
        let mut out: Vec<ResourceInfo> = self
            .inner
            .resources
            .iter()
            .map(|r| {
                let i = r.value();
                ResourceInfo {
                    method: i.http_method().to_string(),
                    path: i.resource_path().to_string(),
                    metric: i.metric_name().to_string(),
                    tags: i.tag_extractor().tag_names().map(str::to_string).collect(),
                }
            })
            .collect();
        out.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
        out
    }
}
