//! Application assembly and the serve loop.

use axum::Router;

use restime_core::error::Result;

use crate::app_state::AppState;
use crate::config::ServerConfig;
use crate::modules::ServerModule;
use crate::router;

/// Build the shared state and the router for `cfg` and `modules`.
///
/// Fails on invalid bindings, e.g. two timed resources for the same
/// `(method, path)`.
pub fn build_app(cfg: ServerConfig, modules: &[Box<dyn ServerModule>]) -> Result<(AppState, Router)> {
    let state = AppState::new(cfg);
    let router = router::build_router(state.clone(), modules)?;
    Ok((state, router))
}

/// Serve until Ctrl+C / SIGTERM.
pub async fn serve(cfg: ServerConfig, modules: &[Box<dyn ServerModule>]) -> Result<()> {
    let listen = cfg.listen_addr()?;
    let (state, app) = build_app(cfg, modules)?;

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(
        %listen,
        namespace = %state.cfg().metrics.namespace,
        resources = state.resources().len(),
        "restime-server starting"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("restime-server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
