//! The web front end: an index page linking the current archive and a
//! download route that serves it.

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;

use axum::{Router, routing::get};
use miette::IntoDiagnostic;
use repack_config::ServeMode;
use tokio::net::TcpListener;

pub use error::ServerError;
pub use state::{AppState, download_href};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/download/{filename}", get(handlers::download))
        .with_state(state)
}

/// Builds the archive once when serving eagerly.
///
/// A failed build is logged and the server starts without an archive, the
/// index page then says so.
pub async fn prepare(state: &AppState) {
    if state.config().serve_mode != ServeMode::Eager {
        tracing::info!("serving lazily, the archive is built on every download");
        return;
    }

    if let Err(err) = state.rebuild().await {
        let report = miette::Report::new(err);
        tracing::error!("failed to produce the archive at startup: {report:?}");
    }
}

/// Serves `state` on `addr` until Ctrl-C is received.
pub async fn serve(state: AppState, addr: SocketAddr) -> miette::Result<()> {
    let listener = TcpListener::bind(addr).await.into_diagnostic()?;
    let local_addr = listener.local_addr().into_diagnostic()?;
    tracing::info!("listening on http://{local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {err}");
        // Never resolve, the server then runs until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
