//! Operator bootstrap.
//!
//! Sequences the startup steps in a fixed order:
//!
//! 1. check the lease timing, then resolve the watch scope
//! 2. start the health probe server (background, never fatal)
//! 3. acquire leadership (blocks while another instance holds the lease)
//! 4. construct the manager, register the scheme, then the controllers
//! 5. publish the metrics Service
//! 6. run the manager until the shutdown signal
//!
//! A bad lease timing and every failure from step 3 onwards is fatal and
//! maps to exit status 1.
//! Nothing is rolled back: process exit releases whatever was held.

use std::future::Future;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Settings;
use crate::health::{BootstrapPhase, HealthState, spawn_health_server};
use crate::leader::{
    LeaderElectionError, LeaderElector, LeadershipLost, LockBackend, check_lease_timing,
};
use crate::manager::{AddToManager, AddToScheme, Manager, ManagerConfig, ManagerError};
use crate::namespace::{DownwardApi, NamespaceResolver, WatchNamespaceSource};
use crate::publisher::{MetricsPublisher, PublishError, ServiceStore};
use crate::resources::MetricsServiceDescriptor;

/// Fatal bootstrap failures
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Logging could not be initialized
    #[error("failed to initialize logging: {0}")]
    Telemetry(String),

    /// Settings that cannot work together
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] LeaderElectionError),

    /// The cluster connection could not be configured
    #[error("failed to get cluster config: {0}")]
    ConfigAcquisition(#[source] kube::Error),

    #[error("failed to acquire leadership: {0}")]
    Leadership(#[source] LeaderElectionError),

    #[error("failed to construct manager: {0}")]
    ManagerConstruction(#[source] ManagerError),

    #[error("failed to register scheme: {0}")]
    SchemeRegistration(#[source] ManagerError),

    #[error("failed to register controllers: {0}")]
    ControllerRegistration(#[source] ManagerError),

    #[error("failed to publish metrics service: {0}")]
    MetricsPublication(#[source] PublishError),

    #[error("manager exited non-zero: {0}")]
    RunLoop(#[source] ManagerError),

    /// Leadership ended while the manager was running
    #[error("leadership lost: {0}")]
    LeadershipLost(LeadershipLost),
}

impl BootstrapError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Whether this failure was reported through tracing. Only a failure to
    /// set up logging itself was not.
    pub fn is_logged(&self) -> bool {
        !matches!(self, BootstrapError::Telemetry(_))
    }
}

/// Exit status for a finished bootstrap run
pub fn exit_code(result: &Result<(), BootstrapError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(e.exit_code()),
    }
}

/// Builds the manager once leadership is held
#[cfg_attr(test, automock)]
pub trait ManagerFactory: Send + Sync {
    fn construct(&self, config: ManagerConfig) -> Result<Manager, ManagerError>;
}

/// Builds a [`Manager`] straight from its configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultManagerFactory;

impl ManagerFactory for DefaultManagerFactory {
    fn construct(&self, config: ManagerConfig) -> Result<Manager, ManagerError> {
        Manager::new(config)
    }
}

/// Startup parameters
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub health_probe_bind_address: SocketAddr,
    pub lock_name: String,
    /// Leader identity, usually the pod name
    pub identity: String,
    /// How long a lease stays live without renewal
    pub lease_ttl: Duration,
    /// Contention retry and lease renewal period
    pub lease_renew_interval: Duration,
    pub sync_period: Duration,
    pub metrics_bind_address: String,
    pub metrics_port: u16,
    pub operator_name: String,
    /// Namespace the operator runs in; holds the metrics Service
    pub operator_namespace: String,
}

impl BootstrapConfig {
    /// Build and validate the startup parameters
    pub fn from_settings(
        settings: &Settings,
        identity: &str,
        operator_namespace: &str,
    ) -> Result<Self, BootstrapError> {
        let config = Self {
            health_probe_bind_address: settings.health_probe_bind_address,
            lock_name: settings.lock_name.clone(),
            identity: identity.to_string(),
            lease_ttl: settings.lease_ttl,
            lease_renew_interval: settings.lease_renew_interval,
            sync_period: settings.sync_period,
            metrics_bind_address: settings.metrics_bind_address(),
            metrics_port: settings.metrics_port,
            operator_name: settings.operator_name.clone(),
            operator_namespace: operator_namespace.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject lease timing under which two instances could both lead
    pub fn validate(&self) -> Result<(), BootstrapError> {
        check_lease_timing(self.lease_ttl, self.lease_renew_interval)
            .map_err(BootstrapError::InvalidConfig)
    }
}

/// Stops the health server when bootstrap returns
struct HealthTask(JoinHandle<()>);

impl Drop for HealthTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Everything the bootstrap talks to outside this process
pub struct Collaborators {
    pub lock: Arc<dyn LockBackend>,
    pub manager_factory: Box<dyn ManagerFactory>,
    pub scheme_builder: Box<dyn AddToScheme>,
    pub controllers: Box<dyn AddToManager>,
    pub services: Arc<dyn ServiceStore>,
}

/// Runs the startup sequence and then the manager
pub struct BootstrapOrchestrator<D = DownwardApi> {
    config: BootstrapConfig,
    resolver: NamespaceResolver<D>,
    collaborators: Collaborators,
    health: Arc<HealthState>,
}

impl<D: WatchNamespaceSource> BootstrapOrchestrator<D> {
    pub fn new(
        config: BootstrapConfig,
        resolver: NamespaceResolver<D>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            resolver,
            collaborators,
            health: Arc::new(HealthState::new()),
        }
    }

    /// Probe state shared with the health server
    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    /// Run until `shutdown` resolves (`Ok`) or a fatal step fails (`Err`)
    pub async fn run<F>(self, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send,
    {
        let health = self.health();
        let result = self.bootstrap(shutdown).await;

        health.set_ready(false).await;
        match &result {
            Ok(()) => {
                health.set_phase(BootstrapPhase::ShuttingDown).await;
                info!("Operator stopped");
            }
            Err(e) => {
                health.set_phase(BootstrapPhase::Failed).await;
                error!(error = %e, "Operator bootstrap failed");
            }
        }
        result
    }

    async fn bootstrap<F>(self, shutdown: F) -> Result<(), BootstrapError>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            config,
            resolver,
            collaborators,
            health,
        } = self;

        config.validate()?;
        let scope = resolver.resolve();

        // Serves health checks until bootstrap returns; a bind failure is only logged
        let _health_task = HealthTask(spawn_health_server(
            config.health_probe_bind_address,
            Arc::clone(&health),
        ));

        health.set_phase(BootstrapPhase::AwaitingLeadership).await;
        let elector = LeaderElector::new(
            collaborators.lock,
            &config.lock_name,
            &config.identity,
            config.lease_renew_interval,
        );
        let mut leadership = elector
            .acquire()
            .await
            .map_err(BootstrapError::Leadership)?;
        health.set_phase(BootstrapPhase::Leading).await;

        let manager_config = ManagerConfig::new(
            scope,
            config.sync_period,
            config.metrics_bind_address.clone(),
        );
        let mut manager = collaborators
            .manager_factory
            .construct(manager_config)
            .map_err(BootstrapError::ManagerConstruction)?;
        manager
            .register_scheme(collaborators.scheme_builder.as_ref())
            .map_err(BootstrapError::SchemeRegistration)?;
        manager
            .register_controllers(collaborators.controllers.as_ref())
            .map_err(BootstrapError::ControllerRegistration)?;

        health.set_ready(true).await;
        health.set_phase(BootstrapPhase::Registered).await;

        let publisher = MetricsPublisher::new(
            collaborators.services,
            &config.operator_name,
            &config.operator_namespace,
        );
        publisher
            .publish(&[MetricsServiceDescriptor::for_port(config.metrics_port)])
            .await
            .map_err(BootstrapError::MetricsPublication)?;

        health.set_phase(BootstrapPhase::Running).await;
        info!("Starting the manager");
        tokio::select! {
            result = manager.run(shutdown) => result.map_err(BootstrapError::RunLoop),
            reason = leadership.lost() => Err(BootstrapError::LeadershipLost(reason)),
        }
    }
}
