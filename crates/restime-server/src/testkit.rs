//! Ephemeral server for tests.
//!
//! [`TestServer`] runs the full app on a background thread with its own
//! tokio runtime, so it works from plain `#[test]`s and from any async test
//! runtime alike. Dropping it shuts the server down gracefully and joins the
//! thread.

use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::oneshot;

use restime_core::error::{RestimeError, Result};

use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::modules::ServerModule;
use crate::server::build_app;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// A currently unused local TCP port.
///
/// The port is released before returning, so another process may still
/// grab it; [`TestServer::start`] reports that as a start failure.
pub fn free_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

pub struct TestServer {
    addr: SocketAddr,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start on `127.0.0.1` and a free port with the default config.
    pub fn start(modules: Vec<Box<dyn ServerModule>>) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], free_port()?));
        Self::start_with(ServerConfig::default_for_testing(addr), modules)
    }

    /// Start with `cfg`. A listen port of `0` binds any free port.
    pub fn start_with(cfg: ServerConfig, modules: Vec<Box<dyn ServerModule>>) -> Result<Self> {
        cfg.validate()?;
        let listen = cfg.listen_addr()?;
        let (state, app) = build_app(cfg, &modules)?;

        let listener = TcpListener::bind(listen)
            .map_err(|e| RestimeError::ServerStart(format!("bind {listen} failed: {e}")))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

        let thread = std::thread::Builder::new()
            .name(format!("restime-test-{}", addr.port()))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("runtime build failed: {e}")));
                        return;
                    }
                };
                rt.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            let _ = ready_tx.send(Err(format!("listener setup failed: {e}")));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    let shutdown = async {
                        let _ = shutdown_rx.await;
                    };
                    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                        tracing::error!(%addr, error = %e, "test server failed");
                    }
                });
            })
            .map_err(|e| RestimeError::ServerStart(format!("spawn failed: {e}")))?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => {
                let _ = thread.join();
                return Err(RestimeError::ServerStart(msg));
            }
            Err(_) => {
                return Err(RestimeError::ServerStart(format!(
                    "server on {addr} not ready after {READY_TIMEOUT:?}"
                )));
            }
        }

        tracing::info!(%addr, "test server started");
        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(addr = %self.addr, "test server thread panicked");
            }
        }
    }
}
