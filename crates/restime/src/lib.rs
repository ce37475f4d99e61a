//! Top-level facade crate for restime.
//!
//! Re-exports the core interceptor types and the server library so users can
//! depend on a single crate.

pub mod core {
    pub use restime_core::*;
}

pub mod server {
    pub use restime_server::*;
}
