//! Axum router wiring.
//!
//! The ops endpoints are always mounted; every other route comes from the
//! server modules, configured in order into one [`Binder`].

use axum::Router;

use restime_core::error::Result;

use crate::app_state::AppState;
use crate::modules::{Binder, ServerModule};
use crate::ops::OpsModule;

pub fn build_router(state: AppState, modules: &[Box<dyn ServerModule>]) -> Result<Router> {
    let mut binder = Binder::new();
    OpsModule.configure(&mut binder);
    for module in modules {
        tracing::debug!(module = module.name(), "configuring module");
        module.configure(&mut binder);
    }
    binder.into_router(state)
}
