//! Health probe server.
//!
//! Provides:
//! - `/` - Liveness probe (always returns 200 once the listener is bound)
//! - `/ready` - Readiness probe (200 once leadership is held and the manager
//!   has its scheme and controllers registered, 503 otherwise)
//!
//! The server starts before leader election so the platform can tell a
//! standby instance apart from a crashed one.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Coarse progress of the bootstrap sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootstrapPhase {
    #[default]
    Starting,
    AwaitingLeadership,
    Leading,
    Registered,
    Running,
    ShuttingDown,
    Failed,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapPhase::Starting => write!(f, "Starting"),
            BootstrapPhase::AwaitingLeadership => write!(f, "AwaitingLeadership"),
            BootstrapPhase::Leading => write!(f, "Leading"),
            BootstrapPhase::Registered => write!(f, "Registered"),
            BootstrapPhase::Running => write!(f, "Running"),
            BootstrapPhase::ShuttingDown => write!(f, "ShuttingDown"),
            BootstrapPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Shared state for the health server
#[derive(Debug, Default)]
pub struct HealthState {
    /// Whether the operator is ready (holds leadership, manager registered)
    ready: RwLock<bool>,
    phase: RwLock<BootstrapPhase>,
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Record bootstrap progress
    pub async fn set_phase(&self, phase: BootstrapPhase) {
        debug!(phase = %phase, "Bootstrap phase changed");
        *self.phase.write().await = phase;
    }

    pub async fn phase(&self) -> BootstrapPhase {
        *self.phase.read().await
    }
}

/// Liveness probe handler
///
/// If we can respond, we're alive.
async fn liveness() -> impl IntoResponse {
    debug!("ping");
    StatusCode::OK
}

/// Readiness probe handler
async fn readiness(State(state): State<Arc<HealthState>>) -> Response {
    debug!("ready");
    if state.is_ready().await {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

/// Run the health server on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<HealthState>) -> Result<(), std::io::Error> {
    axum::serve(listener, create_router(state)).await
}

/// Bind and run the health server until the process exits
pub async fn run_health_server(
    addr: SocketAddr,
    state: Arc<HealthState>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Liveness probe listening");
    serve(listener, state).await
}

/// Start the health server as a background task.
///
/// Bind and serve failures are logged, never propagated: the rest of the
/// bootstrap continues without probes.
pub fn spawn_health_server(addr: SocketAddr, state: Arc<HealthState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_health_server(addr, state).await {
            error!(address = %addr, error = %e, "Failed to start health probe");
        }
    })
}
