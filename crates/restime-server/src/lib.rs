//! restime server library entry.
//!
//! Wires the timing interceptor of `restime-core` into axum: server modules
//! bind timed resources, exception mappers and shared instances; the
//! resource metrics registry is the interceptors' sink and is exposed in
//! Prometheus text format. Consumed by the binary (`main.rs`) and by
//! integration tests through [`testkit::TestServer`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod error;
pub mod mappers;
pub mod modules;
pub mod obs;
pub mod ops;
pub mod resources;
pub mod router;
pub mod server;
pub mod testkit;
pub mod timed;

pub use app_state::AppState;
pub use error::ApiError;
pub use mappers::ResponseMappers;
pub use modules::{Binder, ServerModule};
pub use server::{build_app, serve};
pub use testkit::TestServer;
pub use timed::Timed;
