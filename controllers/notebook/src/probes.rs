//! Health probe endpoints.
//!
//! `/healthz` answers as long as the process serves HTTP. `/readyz` turns
//! OK once every enabled control loop has listed its notebooks.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Count of control loops whose caches have not finished their first list
#[derive(Debug, Clone)]
pub struct Readiness {
    pending: Arc<AtomicUsize>,
}

impl Readiness {
    /// Readiness waiting on `loops` control loops
    #[must_use]
    pub fn new(loops: usize) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(loops)),
        }
    }

    /// Record that one loop's notebook cache is in sync
    pub fn mark_synced(&self) {
        // Saturates at zero
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// True once every loop has synced
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    status: &'static str,
}

async fn healthz() -> Json<ProbeResponse> {
    Json(ProbeResponse { status: "ok" })
}

async fn readyz(State(ready): State<Readiness>) -> (StatusCode, Json<ProbeResponse>) {
    if ready.is_ready() {
        (StatusCode::OK, Json(ProbeResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeResponse { status: "not_ready" }),
        )
    }
}

/// Probe routes backed by the shared readiness count
pub fn router(ready: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

/// Serve the probe routes on `addr` until the process exits
///
/// # Errors
///
/// Returns [`ControllerError::Probe`] if the listener cannot be bound.
pub async fn serve(addr: SocketAddr, ready: Readiness) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Probe server listening on {}", addr);
    axum::serve(listener, router(ready)).await?;
    Ok(())
}
