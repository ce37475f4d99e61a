//! Request timing interceptor.
//!
//! Wraps one resource-handler invocation: measures its latency, classifies
//! the outcome as an HTTP status and reports `(status, elapsed)` to the
//! [`MetricSink`] under a [`TimerKey`]. The handler's value or error is
//! passed through unchanged.
//!
//! Reporting happens in the `Drop` of [`ResourceCall`], so it runs exactly
//! once on every exit path:
//! - normal completion: status from the return value or the error;
//! - panic in the handler or in a mapper: `500`;
//! - call dropped before completion (cancelled future): [`UNDETERMINED`].
//!
//! Tag values are read when the call begins and reported when it ends. A tag
//! extraction failure never replaces the handler outcome: it is logged and
//! the update for that call is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;

use crate::error::Result;
use crate::status::{
    classify, Classification, HandlerFailure, HandlerReturn, StatusClassifier,
    INTERNAL_SERVER_ERROR, UNDETERMINED,
};
use crate::tag::{Arg, MetricTag, MetricTags, TagExtractor};
use crate::timer::{MetricSink, TimerKey};

/// Registration-time declaration of a timed resource.
#[derive(Debug, Clone)]
pub struct TimedResource {
    pub method: Method,
    pub path: String,
    pub metric_name: String,
    /// Tag declaration per handler parameter, in parameter order.
    pub params: Vec<Option<MetricTag>>,
}

impl TimedResource {
    pub fn new(method: Method, path: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            metric_name: metric_name.into(),
            params: Vec::new(),
        }
    }

    /// Next parameter contributes `tag`.
    pub fn tagged(mut self, tag: MetricTag) -> Self {
        self.params.push(Some(tag));
        self
    }

    /// Next parameter contributes nothing.
    pub fn untagged(mut self) -> Self {
        self.params.push(None);
        self
    }
}

pub struct TimedResourceInterceptor {
    resource_path: String,
    metric_name: String,
    http_method: String,
    tags: TagExtractor,
    sink: Arc<dyn MetricSink>,
    classifier: Arc<dyn StatusClassifier>,
}

impl TimedResourceInterceptor {
    pub fn new(
        resource: &TimedResource,
        sink: Arc<dyn MetricSink>,
        classifier: Arc<dyn StatusClassifier>,
    ) -> Self {
        Self {
            resource_path: resource.path.clone(),
            metric_name: resource.metric_name.clone(),
            http_method: resource.method.as_str().to_string(),
            tags: TagExtractor::new(resource.params.iter().cloned()),
            sink,
            classifier,
        }
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn http_method(&self) -> &str {
        &self.http_method
    }

    pub fn tag_extractor(&self) -> &TagExtractor {
        &self.tags
    }

    /// Start timing a call. The returned guard reports when it is completed
    /// or dropped.
    pub fn begin(&self, args: &[Arg<'_>]) -> ResourceCall<'_> {
        let started = Instant::now();
        let tags = self.tags.extract(args);
        ResourceCall {
            interceptor: self,
            started,
            tags: Some(tags),
            status: None,
        }
    }

    /// Time a synchronous handler.
    pub fn intercept<R, E, F>(&self, args: &[Arg<'_>], proceed: F) -> std::result::Result<R, E>
    where
        R: HandlerReturn,
        E: HandlerFailure,
        F: FnOnce() -> std::result::Result<R, E>,
    {
        let call = self.begin(args);
        let result = proceed();
        call.complete(result)
    }

    /// Time an async handler. Arguments are only borrowed while the call
    /// begins, so the returned future does not hold on to them.
    ///
    /// The clock starts when this is called, not when the future is first
    /// polled; await the returned future right away.
    pub fn intercept_async<'a, R, E, Fut>(
        &'a self,
        args: &[Arg<'_>],
        fut: Fut,
    ) -> impl Future<Output = std::result::Result<R, E>> + 'a
    where
        R: HandlerReturn + 'a,
        E: HandlerFailure,
        Fut: Future<Output = std::result::Result<R, E>> + 'a,
    {
        let call = self.begin(args);
        async move {
            let result = fut.await;
            call.complete(result)
        }
    }

    fn outcome<R, E>(&self, result: &std::result::Result<R, E>) -> u16
    where
        R: HandlerReturn,
        E: HandlerFailure,
    {
        match result {
            Ok(value) => value.returned().status(),
            Err(err) => {
                let classification = classify(err, &*self.classifier);
                if classification == Classification::Unmapped {
                    tracing::debug!(
                        resource = %self.resource_path,
                        method = %self.http_method,
                        error = %err,
                        "no exception mapper matched; classified as 500"
                    );
                }
                classification.status()
            }
        }
    }

    /// Report an outcome observed outside a [`ResourceCall`], e.g. a request
    /// rejected before the handler ran. Every declared tag is reported as
    /// null since no argument was seen.
    pub fn record_outcome(&self, status: u16, elapsed: Duration) {
        self.record(Ok(self.tags.null_tags()), status, elapsed);
    }

    fn record(&self, tags: Result<MetricTags>, status: u16, elapsed: Duration) {
        let tags = match tags {
            Ok(tags) => tags,
            Err(e) => {
                tracing::error!(
                    resource = %self.resource_path,
                    method = %self.http_method,
                    metric = %self.metric_name,
                    status,
                    code = e.code(),
                    error = %e,
                    "metric tag extraction failed; timing not recorded"
                );
                return;
            }
        };

        let key = TimerKey {
            resource_path: self.resource_path.clone(),
            metric_name: self.metric_name.clone(),
            http_method: self.http_method.clone(),
            tags,
        };
        self.sink.update(&key, status, elapsed);

        tracing::debug!(
            resource = %self.resource_path,
            method = %self.http_method,
            metric = %self.metric_name,
            status,
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "resource timed"
        );
    }
}

impl std::fmt::Debug for TimedResourceInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedResourceInterceptor")
            .field("resource_path", &self.resource_path)
            .field("metric_name", &self.metric_name)
            .field("http_method", &self.http_method)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// One in-flight timed call.
#[must_use = "dropping the call without completing it records an undetermined status"]
pub struct ResourceCall<'a> {
    interceptor: &'a TimedResourceInterceptor,
    started: Instant,
    tags: Option<Result<MetricTags>>,
    status: Option<u16>,
}

impl ResourceCall<'_> {
    /// Classify the handler result and hand it back unchanged.
    pub fn complete<R, E>(mut self, result: std::result::Result<R, E>) -> std::result::Result<R, E>
    where
        R: HandlerReturn,
        E: HandlerFailure,
    {
        self.status = Some(self.interceptor.outcome(&result));
        result
    }

    /// End the call with a status decided by the caller, e.g. the status of
    /// the response actually served.
    pub fn finish(mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for ResourceCall<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let status = match self.status {
            Some(status) => status,
            None if std::thread::panicking() => INTERNAL_SERVER_ERROR,
            None => UNDETERMINED,
        };
        if let Some(tags) = self.tags.take() {
            self.interceptor.record(tags, status, elapsed);
        }
    }
}
