//! Publication of the metrics Service.
//!
//! Publishing is idempotent: a Service that already exists with the desired
//! ports and selector is left untouched, one that differs is replaced in
//! place (keeping its `resourceVersion` and `clusterIP`).

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::{debug, info};

use crate::resources::{MetricsServiceDescriptor, generate_metrics_service};

/// Metrics publication errors
#[derive(Debug, Error)]
pub enum PublishError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The Service disappeared between "already exists" and the follow-up read
    #[error("service {namespace}/{name} vanished during publication")]
    Vanished { namespace: String, name: String },
}

/// Minimal Service API used by the publisher
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Service>, kube::Error>;
    async fn create(&self, namespace: &str, service: &Service) -> Result<Service, kube::Error>;
    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<Service, kube::Error>;
}

/// [`ServiceStore`] backed by the Kubernetes API
pub struct KubeServiceStore {
    client: Client,
}

impl KubeServiceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ServiceStore for KubeServiceStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Service>, kube::Error> {
        self.api(namespace).get_opt(name).await
    }

    async fn create(&self, namespace: &str, service: &Service) -> Result<Service, kube::Error> {
        self.api(namespace)
            .create(&PostParams::default(), service)
            .await
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<Service, kube::Error> {
        self.api(namespace)
            .replace(name, &PostParams::default(), service)
            .await
    }
}

/// Creates or updates the Service exposing the operator's metrics port
pub struct MetricsPublisher {
    store: Arc<dyn ServiceStore>,
    operator_name: String,
    namespace: String,
}

impl MetricsPublisher {
    pub fn new(store: Arc<dyn ServiceStore>, operator_name: &str, namespace: &str) -> Self {
        Self {
            store,
            operator_name: operator_name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Make sure the metrics Service exists with exactly these ports
    pub async fn publish(
        &self,
        ports: &[MetricsServiceDescriptor],
    ) -> Result<Service, PublishError> {
        let desired = generate_metrics_service(&self.operator_name, &self.namespace, ports);
        let name = desired.name_any();

        match self.store.get(&self.namespace, &name).await? {
            Some(existing) => self.update_if_changed(existing, desired).await,
            None => match self.store.create(&self.namespace, &desired).await {
                Ok(created) => {
                    info!(service = %name, namespace = %self.namespace, "Created metrics service");
                    Ok(created)
                }
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    debug!(service = %name, "Metrics service created concurrently, re-reading");
                    let existing = self.store.get(&self.namespace, &name).await?.ok_or_else(|| {
                        PublishError::Vanished {
                            namespace: self.namespace.clone(),
                            name: name.clone(),
                        }
                    })?;
                    self.update_if_changed(existing, desired).await
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn update_if_changed(
        &self,
        existing: Service,
        mut desired: Service,
    ) -> Result<Service, PublishError> {
        let name = existing.name_any();
        if service_matches(&existing, &desired) {
            info!(service = %name, namespace = %self.namespace, "Metrics service already up to date");
            return Ok(existing);
        }

        desired.metadata.resource_version = existing.metadata.resource_version.clone();
        if let (Some(spec), Some(current)) = (desired.spec.as_mut(), existing.spec.as_ref()) {
            spec.cluster_ip = current.cluster_ip.clone();
            spec.cluster_ips = current.cluster_ips.clone();
        }

        let updated = self.store.replace(&self.namespace, &name, &desired).await?;
        info!(service = %name, namespace = %self.namespace, "Updated metrics service");
        Ok(updated)
    }
}

type PortKey = (Option<String>, i32, String, Option<String>);

fn port_keys(ports: Option<&Vec<ServicePort>>) -> Vec<PortKey> {
    let mut keys: Vec<PortKey> = ports
        .into_iter()
        .flatten()
        .map(|p| {
            (
                p.name.clone(),
                p.port,
                p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                p.target_port.as_ref().map(|t| match t {
                    IntOrString::Int(i) => i.to_string(),
                    IntOrString::String(s) => s.clone(),
                }),
            )
        })
        .collect();
    keys.sort();
    keys
}

/// Whether `existing` already exposes what `desired` asks for
fn service_matches(existing: &Service, desired: &Service) -> bool {
    let (Some(current), Some(wanted)) = (existing.spec.as_ref(), desired.spec.as_ref()) else {
        return false;
    };
    current.selector == wanted.selector
        && port_keys(current.ports.as_ref()) == port_keys(wanted.ports.as_ref())
}
