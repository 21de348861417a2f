//! Controllers registered into the manager.
//!
//! [`VaultControllers`] is the operator's [`AddToManager`]: it refuses to
//! register anything for a type the scheme does not know, then adds one
//! [`VaultController`] runnable that watches Vaults within the manager's scope.

pub mod context;
pub mod error;
pub mod reconciler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::crd::Vault;
use crate::manager::{AddToManager, ControllerError, Manager, ManagerError, Metrics, Runnable};
use crate::namespace::ScopeDescriptor;
use context::Context;

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all controllers.
///
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Registers the operator's controllers
#[derive(Clone)]
pub struct VaultControllers {
    client: Client,
}

impl VaultControllers {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl AddToManager for VaultControllers {
    fn add_to_manager(&self, manager: &mut Manager) -> Result<(), ControllerError> {
        if !manager.scheme().recognizes::<Vault>() {
            return Err(ControllerError::TypeNotRegistered(format!(
                "{}/{}",
                Vault::api_version(&()),
                Vault::kind(&())
            )));
        }

        let config = manager.config();
        let controller = VaultController {
            client: self.client.clone(),
            scope: config.scope.clone(),
            sync_period: config.sync_period,
            metrics: manager.metrics(),
        };
        manager.add(Box::new(controller))
    }
}

/// Watches and reconciles Vault resources until shutdown
pub struct VaultController {
    client: Client,
    scope: ScopeDescriptor,
    sync_period: Duration,
    metrics: Arc<Metrics>,
}

#[async_trait]
impl Runnable for VaultController {
    fn name(&self) -> &str {
        "vault-controller"
    }

    async fn start(self: Box<Self>, shutdown: CancellationToken) -> Result<(), ManagerError> {
        info!(scope = %self.scope, "Starting controller for Vault resources");

        let ctx = Arc::new(Context::new(
            self.client.clone(),
            self.metrics,
            self.sync_period,
        ));
        let vaults: Api<Vault> = scoped_api(self.client, self.scope.namespace());

        let controller = Controller::new(vaults, default_watcher_config())
            .graceful_shutdown_on(shutdown.clone().cancelled_owned())
            .run(reconciler::reconcile, reconciler::error_policy, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => {
                        debug!("Reconciled: {}", obj.name);
                    }
                    Err(e) => {
                        // Watch events for a deleted object still trigger a pass
                        let is_not_found = match &e {
                            kube::runtime::controller::Error::ObjectNotFound(_) => true,
                            kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                                err.is_not_found()
                            }
                            _ => false,
                        };
                        if is_not_found {
                            debug!("Object no longer exists (likely deleted): {:?}", e);
                        } else {
                            error!("Reconciliation error: {:?}", e);
                        }
                    }
                }
            });

        // The stream only drains once the watcher yields, which never happens
        // while the API server is unreachable
        tokio::select! {
            _ = controller => {
                if shutdown.is_cancelled() {
                    info!("Vault controller stopped");
                    Ok(())
                } else {
                    error!("Controller stream ended unexpectedly");
                    Err(ManagerError::RunLoop(
                        "vault controller stream ended unexpectedly".to_string(),
                    ))
                }
            }
            _ = shutdown.cancelled() => {
                info!("Vault controller stopped");
                Ok(())
            }
        }
    }
}
