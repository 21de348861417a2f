//! Shared context for the Vault controller.
//!
//! The Context struct holds shared state that is passed to the reconciler,
//! including the Kubernetes client, the manager's metrics and the sync period.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::crd::Vault;
use crate::manager::Metrics;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "vault-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Metrics registry owned by the manager
    pub metrics: Arc<Metrics>,
    /// Minimum frequency at which each Vault is reconciled
    pub sync_period: Duration,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, metrics: Arc<Metrics>, sync_period: Duration) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            metrics,
            sync_period,
        }
    }

    /// Publish a warning event for a Vault
    pub async fn publish_warning_event(
        &self,
        resource: &Vault,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_: EventType::Warning,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish warning event");
        }
    }
}
