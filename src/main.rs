//! vault-operator - A Kubernetes operator for managing Vault custom resources.
//!
//! This is the main entry point that:
//! - Parses flags and initializes structured logging
//! - Creates the Kubernetes client
//! - Hands everything to the bootstrap, which runs leader election, the
//!   health server, the manager and metrics publication

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};

use vault_operator::bootstrap::{self, DefaultManagerFactory};
use vault_operator::controller::VaultControllers;
use vault_operator::crd::Apis;
use vault_operator::leader::LeaseBackend;
use vault_operator::namespace::operator_namespace;
use vault_operator::publisher::KubeServiceStore;
use vault_operator::telemetry::{init_tracing, log_version_info};
use vault_operator::{
    BootstrapConfig, BootstrapError, BootstrapOrchestrator, Collaborators, NamespaceResolver,
    Settings,
};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::parse();
    let result = run(settings).await;
    if let Err(e) = &result
        && !e.is_logged()
    {
        eprintln!("vault-operator: {e}");
    }
    bootstrap::exit_code(&result)
}

async fn run(settings: Settings) -> Result<(), BootstrapError> {
    init_tracing(settings.verbose).map_err(|e| BootstrapError::Telemetry(e.to_string()))?;
    log_version_info();

    let client = Client::try_default().await.map_err(|e| {
        error!(error = %e, "Failed to get cluster config");
        BootstrapError::ConfigAcquisition(e)
    })?;
    info!("Connected to Kubernetes cluster");

    let identity = settings.pod_name.clone().unwrap_or_else(|| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = operator_namespace(settings.pod_namespace.as_deref());

    info!(
        holder_id = %identity,
        namespace = %namespace,
        lease_name = %settings.lock_name,
        "Initializing leader election"
    );

    let collaborators = Collaborators {
        lock: Arc::new(LeaseBackend::new(
            client.clone(),
            &namespace,
            &settings.lock_name,
            &identity,
            settings.lease_ttl,
        )),
        manager_factory: Box::new(DefaultManagerFactory),
        scheme_builder: Box::new(Apis),
        controllers: Box::new(VaultControllers::new(client.clone())),
        services: Arc::new(KubeServiceStore::new(client)),
    };

    let config = BootstrapConfig::from_settings(&settings, &identity, &namespace)
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    BootstrapOrchestrator::new(
        config,
        NamespaceResolver::new(settings.operator_namespace.clone()),
        collaborators,
    )
    .run(shutdown_signal())
    .await
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the operator cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, initiating graceful shutdown...");
}
