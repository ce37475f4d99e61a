//! restime core: transport-agnostic timing of HTTP resource handlers.
//!
//! This crate defines the request timing interceptor and everything it
//! consults: metric tag extraction, outcome classification, the timer key
//! and the metric sink contract. It carries no server or runtime
//! dependencies; `restime-server` wires it into axum.
//!
//! # Panic policy
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `RestimeError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod interceptor;
pub mod status;
pub mod tag;
pub mod timer;

/// Shared result type.
pub use error::{RestimeError, Result};
pub use interceptor::{ResourceCall, TimedResource, TimedResourceInterceptor};
pub use status::{
    Classification, ExceptionMappers, HandlerFailure, HandlerReturn, Returned, StatusClassifier,
};
pub use tag::{arg, opt_arg, Arg, MetricTag, MetricTags, TagSource, TagValue};
pub use timer::{MetricSink, TimerKey};
