//! Vault Custom Resource Definition.
//!
//! Only the fields the operator's own bookkeeping touches are modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Vault is a custom resource describing a Vault deployment.
///
/// Example:
/// ```yaml
/// apiVersion: vault.banzaicloud.com/v1alpha1
/// kind: Vault
/// metadata:
///   name: vault
/// spec:
///   size: 1
///   image: vault:1.1.2
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "vault.banzaicloud.com",
    version = "v1alpha1",
    kind = "Vault",
    plural = "vaults",
    status = "VaultStatus",
    namespaced,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VaultSpec {
    /// Number of Vault replicas
    #[serde(default = "default_size")]
    pub size: i32,

    /// Vault container image
    #[serde(default = "default_image")]
    pub image: String,
}

fn default_size() -> i32 {
    1
}

fn default_image() -> String {
    "vault:1.1.2".to_string()
}

/// Observed state of a Vault
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    /// Generation last seen by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
