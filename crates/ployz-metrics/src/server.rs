//! The `/metrics` HTTP endpoint, served with `axum`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prometheus::{Encoder, TextEncoder};
use tokio::sync::oneshot;

use crate::config::MetricsConfig;
use crate::error::{MetricsError, Result};
use crate::recorder::DeployMetrics;

/// A running `/metrics` server. Dropping this without calling [`Self::shutdown`]
/// leaves the server running until the process exits; call `shutdown` for a
/// graceful stop (used in tests and CLI `Ctrl+C` handling).
pub struct MetricsServer {
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MetricsServer {
    /// Requests the server stop accepting new connections and waits for it
    /// to finish in-flight ones.
    pub async fn shutdown(self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn serve_metrics(State(metrics): State<Arc<DeployMetrics>>) -> impl IntoResponse {
    let families = metrics.registry().gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        tracing::warn!(%err, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    match String::from_utf8(buf) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            tracing::warn!(%err, "metrics body was not valid utf-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Starts the `/metrics` HTTP server in the background, returning a handle
/// usable to shut it down.
///
/// # Errors
///
/// Returns [`MetricsError::Server`] if the configured address cannot be bound.
pub async fn serve(config: &MetricsConfig, metrics: Arc<DeployMetrics>) -> Result<MetricsServer> {
    let app = Router::new().route("/metrics", get(serve_metrics)).with_state(metrics);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(MetricsError::Server)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(err) = result {
            tracing::warn!(%err, "metrics server exited with an error");
        }
    });

    Ok(MetricsServer {
        shutdown_tx: Mutex::new(Some(shutdown_tx)),
        handle,
    })
}
