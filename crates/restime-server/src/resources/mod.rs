//! Built-in demo resources.
//!
//! Used by the binary and by the integration tests; shows raw and property
//! tags, carried and mapped errors, and void handlers.

pub mod demo;
pub mod store;

pub use demo::{DemoModule, ItemsError};
pub use store::{Item, ItemStore, ItemStoreError, NewItem};
