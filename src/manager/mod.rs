//! Reconciliation manager.
//!
//! The manager owns the scheme, the registered controllers and the metrics
//! endpoint. It is driven through a strictly ordered protocol:
//!
//! 1. [`Manager::new`] validates the [`ManagerConfig`]
//! 2. [`Manager::register_scheme`] hands the scheme to an [`AddToScheme`]
//! 3. [`Manager::register_controllers`] hands the manager to an [`AddToManager`]
//! 4. [`Manager::run`] drives every runnable until the shutdown signal
//!
//! A failing step moves the manager to [`ManagerPhase::Failed`] and every
//! later step is refused.

pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod scheme;

pub use error::{ControllerError, ManagerError, SchemeError};
pub use lifecycle::{LifecycleStateMachine, ManagerEvent, ManagerPhase, TransitionResult};
pub use metrics::Metrics;
pub use scheme::{Scheme, TypeInfo};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
#[cfg(test)]
use mockall::automock;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::namespace::ScopeDescriptor;
use error::Result;

/// Grace period for runnables to stop after the shutdown signal
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Immutable manager settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Namespace to watch, or cluster-wide
    pub scope: ScopeDescriptor,
    /// Minimum frequency at which watched resources are reconciled
    pub sync_period: Duration,
    /// `host:port` for the metrics endpoint
    pub metrics_bind_address: String,
}

impl ManagerConfig {
    pub fn new(
        scope: ScopeDescriptor,
        sync_period: Duration,
        metrics_bind_address: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            sync_period,
            metrics_bind_address: metrics_bind_address.into(),
        }
    }

    pub fn from_settings(scope: ScopeDescriptor, settings: &Settings) -> Self {
        Self::new(scope, settings.sync_period, settings.metrics_bind_address())
    }

    fn metrics_socket_addr(&self) -> Result<SocketAddr> {
        self.metrics_bind_address.parse().map_err(|e| {
            ManagerError::InvalidConfig(format!(
                "metrics bind address '{}': {e}",
                self.metrics_bind_address
            ))
        })
    }
}

/// Registers resource types into a scheme
#[cfg_attr(test, automock)]
pub trait AddToScheme: Send + Sync {
    fn add_to_scheme(&self, scheme: &mut Scheme) -> std::result::Result<(), SchemeError>;
}

/// Registers controllers into a manager
#[cfg_attr(test, automock)]
pub trait AddToManager: Send + Sync {
    fn add_to_manager(&self, manager: &mut Manager) -> std::result::Result<(), ControllerError>;
}

/// A long-running task the manager starts once it runs
#[async_trait]
pub trait Runnable: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run until `shutdown` is cancelled or a fatal error occurs
    async fn start(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// The reconciliation manager
pub struct Manager {
    config: ManagerConfig,
    metrics_addr: SocketAddr,
    scheme: Scheme,
    metrics: Arc<Metrics>,
    runnables: Vec<Box<dyn Runnable>>,
    phase: ManagerPhase,
    state_machine: LifecycleStateMachine,
}

impl Manager {
    /// Build a manager bound to the given configuration
    pub fn new(config: ManagerConfig) -> Result<Self> {
        if config.sync_period.is_zero() {
            return Err(ManagerError::InvalidConfig(
                "sync period must be greater than zero".to_string(),
            ));
        }
        let metrics_addr = config.metrics_socket_addr()?;

        let mut manager = Self {
            config,
            metrics_addr,
            scheme: Scheme::new(),
            metrics: Arc::new(Metrics::new()),
            runnables: Vec::new(),
            phase: ManagerPhase::Unconstructed,
            state_machine: LifecycleStateMachine::new(),
        };
        manager.apply(ManagerEvent::Construct)?;
        info!(
            scope = %manager.config.scope,
            sync_period_secs = manager.config.sync_period.as_secs_f64(),
            metrics_address = %manager.metrics_addr,
            "Manager constructed"
        );
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn phase(&self) -> ManagerPhase {
        self.phase
    }

    /// Number of runnables registered so far
    pub fn runnable_count(&self) -> usize {
        self.runnables.len()
    }

    /// Register types. Must precede controller registration.
    pub fn register_scheme(&mut self, builder: &dyn AddToScheme) -> Result<()> {
        self.ensure(ManagerEvent::RegisterScheme)?;
        if let Err(e) = builder.add_to_scheme(&mut self.scheme) {
            self.fail();
            return Err(e.into());
        }
        self.apply(ManagerEvent::RegisterScheme)?;
        info!(types = self.scheme.len(), "Scheme registered");
        Ok(())
    }

    /// Register controllers. Only valid once the scheme is ready.
    pub fn register_controllers(&mut self, registrar: &dyn AddToManager) -> Result<()> {
        self.ensure(ManagerEvent::RegisterControllers)?;
        if let Err(e) = registrar.add_to_manager(self) {
            self.fail();
            return Err(e.into());
        }
        self.apply(ManagerEvent::RegisterControllers)?;
        info!(controllers = self.runnables.len(), "Controllers registered");
        Ok(())
    }

    /// Add a runnable. Only allowed while controllers are being registered.
    pub fn add(&mut self, runnable: Box<dyn Runnable>) -> std::result::Result<(), ControllerError> {
        if self.phase != ManagerPhase::SchemeReady {
            return Err(ControllerError::Failed(format!(
                "cannot add runnable {} in phase {}",
                runnable.name(),
                self.phase
            )));
        }
        debug!(runnable = runnable.name(), "Runnable added");
        self.runnables.push(runnable);
        Ok(())
    }

    /// Serve metrics and drive every runnable until `shutdown` resolves.
    ///
    /// Returns `Ok` when stopped by the signal, `Err` when a runnable or the
    /// metrics listener fails first.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.ensure(ManagerEvent::Start)?;

        let listener = match TcpListener::bind(self.metrics_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.fail();
                return Err(ManagerError::MetricsBind {
                    address: self.config.metrics_bind_address.clone(),
                    source,
                });
            }
        };
        self.apply(ManagerEvent::Start)?;
        self.metrics.set_leader(true);
        info!(address = %self.metrics_addr, "Serving metrics");

        let token = CancellationToken::new();
        let mut tasks: JoinSet<(String, Result<()>)> = JoinSet::new();

        {
            let app = metrics_router(self.metrics());
            let stop = token.clone();
            tasks.spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(stop.cancelled_owned())
                    .await
                    .map_err(|e| ManagerError::RunLoop(format!("metrics server: {e}")));
                ("metrics".to_string(), result)
            });
        }

        for runnable in std::mem::take(&mut self.runnables) {
            let name = runnable.name().to_string();
            let stop = token.child_token();
            info!(runnable = %name, "Starting runnable");
            tasks.spawn(async move {
                let result = runnable.start(stop).await;
                (name, result)
            });
        }

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping manager");
                    break Ok(());
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok((name, Ok(()))) => {
                        debug!(runnable = %name, "Runnable finished");
                    }
                    Ok((name, Err(e))) => {
                        error!(runnable = %name, error = %e, "Runnable failed");
                        break Err(ManagerError::RunnableFailed {
                            name,
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Runnable task panicked");
                        break Err(ManagerError::RunLoop(format!("runnable task panicked: {e}")));
                    }
                },
            }
        };

        token.cancel();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "Runnables did not stop within the grace period, aborting"
            );
            tasks.abort_all();
        }
        self.metrics.set_leader(false);

        match outcome {
            Ok(()) => {
                self.apply(ManagerEvent::Stop)?;
                info!("Manager stopped");
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Refuse `event` unless the current phase allows it
    fn ensure(&self, event: ManagerEvent) -> Result<()> {
        if self.state_machine.can_transition(self.phase, event) {
            Ok(())
        } else {
            Err(ManagerError::InvalidTransition {
                current: self.phase,
                event,
            })
        }
    }

    fn apply(&mut self, event: ManagerEvent) -> Result<()> {
        match self.state_machine.transition(self.phase, event) {
            TransitionResult::Success {
                from,
                to,
                description,
            } => {
                debug!(from = %from, to = %to, description, "Manager phase transition");
                self.phase = to;
                Ok(())
            }
            TransitionResult::InvalidTransition { current, event } => {
                Err(ManagerError::InvalidTransition { current, event })
            }
        }
    }

    fn fail(&mut self) {
        if self.apply(ManagerEvent::Fail).is_err() {
            warn!(phase = %self.phase, "Manager already terminal");
        }
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.encode(),
    )
}

/// Router exposing `/metrics`
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}
