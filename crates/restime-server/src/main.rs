//! restime server binary.
//!
//! Reads the config from `$RESTIME_CONFIG` (default `restime.yaml`) and
//! serves the ops endpoints plus the demo resources.

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use restime_server::config;
use restime_server::modules::ServerModule;
use restime_server::resources::DemoModule;

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var(config::CONFIG_PATH_ENV)
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(%path, code = e.code(), error = %e, "config load failed");
            return ExitCode::FAILURE;
        }
    };

    let modules: Vec<Box<dyn ServerModule>> = vec![Box::new(DemoModule::default())];
    match restime_server::serve(cfg, &modules).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}
