use std::net::SocketAddr;

use serde::Deserialize;
use restime_core::error::{RestimeError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RestimeError::UnsupportedVersion);
        }
        self.server.validate()?;
        self.metrics.validate()?;
        Ok(())
    }

    /// Minimal valid config listening on `listen`.
    pub fn default_for_testing(listen: SocketAddr) -> Self {
        Self {
            version: 1,
            server: ServerSection { listen: listen.to_string() },
            metrics: MetricsSection::default(),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen_addr()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|_| {
            RestimeError::InvalidConfig(format!(
                "server.listen must be a valid socket address, got {:?}",
                self.listen
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Prefix of every exported series name.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { namespace: default_namespace() }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        let ns = &self.namespace;
        let valid = ns.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
            && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(RestimeError::InvalidConfig(format!(
                "metrics.namespace must match [a-zA-Z_][a-zA-Z0-9_]*, got {ns:?}"
            )));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_namespace() -> String {
    "restime".into()
}
