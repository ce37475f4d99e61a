//! Server config loader (strict parsing).

pub mod schema;

use std::fs;

use restime_core::error::{RestimeError, Result};

pub use schema::{MetricsSection, ServerConfig, ServerSection};

/// Env var naming the config file read by the binary.
pub const CONFIG_PATH_ENV: &str = "RESTIME_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "restime.yaml";

pub fn load_from_file(path: &str) -> Result<ServerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RestimeError::InvalidConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ServerConfig> {
    let cfg: ServerConfig = serde_yaml::from_str(s)
        .map_err(|e| RestimeError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
