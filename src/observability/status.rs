//! HTTP status endpoints backed by the session snapshot
//!
//! - `GET /health` - 200 while connected, 503 otherwise
//! - `GET /snapshot` - the full current snapshot as JSON
//! - `GET /live` - liveness probe, always 200

use crate::session::SessionSnapshot;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;

/// Health summary derived from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub connection_state: crate::session::ConnectionState,
    pub last_error: Option<String>,
    pub readings_in_window: usize,
    pub checked_at: String,
}

impl HealthReport {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            status: if snapshot.is_connected() {
                "healthy"
            } else {
                "unhealthy"
            },
            connection_state: snapshot.connection_state,
            last_error: snapshot.last_error_message().map(str::to_string),
            readings_in_window: snapshot.history.len(),
            checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
}

/// All status routes, reading from `snapshots` on every request
pub fn routes(
    snapshots: watch::Receiver<SessionSnapshot>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let current = warp::any().map(move || snapshots.borrow().clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(current.clone())
        .map(|snapshot: SessionSnapshot| {
            let report = HealthReport::from_snapshot(&snapshot);
            let code = if report.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(warp::reply::json(&report), code)
        });

    let snapshot = warp::path("snapshot")
        .and(warp::path::end())
        .and(warp::get())
        .and(current)
        .map(|snapshot: SessionSnapshot| warp::reply::json(&snapshot));

    let live = warp::path("live")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&LivenessResponse { alive: true }));

    health.or(snapshot).or(live)
}

/// Status HTTP server
pub struct StatusServer {
    port: u16,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl StatusServer {
    pub fn new(port: u16, snapshots: watch::Receiver<SessionSnapshot>) -> Self {
        Self { port, snapshots }
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), warp::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (addr, server): (SocketAddr, _) = warp::serve(routes(self.snapshots))
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), shutdown)?;
        info!("Status server listening on {}", addr);
        server.await;
        Ok(())
    }
}
