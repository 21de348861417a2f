//! Reconciliation loop for Vault.
//!
//! The bootstrap only needs the controller to be registered and watching.
//! Each pass validates the spec, records the observed generation and
//! requeues after the sync period.

use std::sync::Arc;
use std::time::Instant;

use kube::{
    Api, ResourceExt,
    api::{Patch, PatchParams},
    runtime::controller::Action,
};
use tracing::{debug, error, info, warn};

use crate::controller::context::{Context, FIELD_MANAGER};
use crate::controller::error::Error;
use crate::crd::Vault;

/// Reconcile a Vault
pub async fn reconcile(obj: Arc<Vault>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling Vault");

    if obj.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "Vault is being deleted, nothing to do");
        return Ok(Action::await_change());
    }

    if let Err(e) = validate_spec(&obj) {
        ctx.publish_warning_event(&obj, "ValidationFailed", "Validate", Some(e.to_string()))
            .await;
        return Err(e);
    }

    let observed_gen = obj.status.as_ref().and_then(|s| s.observed_generation);
    let current_gen = obj.metadata.generation;
    if observed_gen != current_gen {
        info!(
            name = %name,
            current_gen = ?current_gen,
            observed_gen = ?observed_gen,
            "Spec changed, recording observed generation"
        );
        let api: Api<Vault> = Api::namespaced(ctx.client.clone(), &namespace);
        update_observed_generation(&api, &name, current_gen).await?;
    }

    ctx.metrics
        .record_reconcile(&namespace, &name, start_time.elapsed().as_secs_f64());

    Ok(Action::requeue(ctx.sync_period))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<Vault>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    ctx.metrics.record_error(&namespace, &name);

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after(ctx.sync_period))
}

/// Validate the resource spec
pub(crate) fn validate_spec(obj: &Vault) -> Result<(), Error> {
    if obj.spec.size < 1 {
        return Err(Error::Validation("size must be at least 1".to_string()));
    }
    if obj.spec.image.trim().is_empty() {
        return Err(Error::Validation("image must not be empty".to_string()));
    }
    Ok(())
}

async fn update_observed_generation(
    api: &Api<Vault>,
    name: &str,
    generation: Option<i64>,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "vault.banzaicloud.com/v1alpha1",
        "kind": "Vault",
        "status": {
            "observedGeneration": generation,
        }
    });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&patch),
    )
    .await?;
    Ok(())
}
