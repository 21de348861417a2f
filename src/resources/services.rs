//! Service generation for the operator's metrics endpoint.
//!
//! The metrics Service makes the manager's `/metrics` listener discoverable
//! inside the cluster. It selects the operator pods by their `name` label.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::resources::common::{metrics_service_name, operator_labels};

/// Conventional name of the metrics port
pub const OPERATOR_PORT_NAME: &str = "http-metrics";

/// Describes one port published for the operator's own metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsServiceDescriptor {
    pub port: i32,
    pub protocol: String,
    pub name: String,
    pub target_port: i32,
}

impl MetricsServiceDescriptor {
    /// TCP port named `http-metrics`, forwarding to the same container port
    pub fn for_port(port: u16) -> Self {
        Self {
            port: i32::from(port),
            protocol: "TCP".to_string(),
            name: OPERATOR_PORT_NAME.to_string(),
            target_port: i32::from(port),
        }
    }

    pub fn to_service_port(&self) -> ServicePort {
        ServicePort {
            port: self.port,
            name: Some(self.name.clone()),
            protocol: Some(self.protocol.clone()),
            target_port: Some(IntOrString::Int(self.target_port)),
            ..Default::default()
        }
    }
}

/// Generate the metrics Service for the operator.
pub fn generate_metrics_service(
    operator_name: &str,
    namespace: &str,
    ports: &[MetricsServiceDescriptor],
) -> Service {
    let labels = operator_labels(operator_name);

    Service {
        metadata: ObjectMeta {
            name: Some(metrics_service_name(operator_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(ports.iter().map(|p| p.to_service_port()).collect()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_for_port() {
        let descriptor = MetricsServiceDescriptor::for_port(8383);
        assert_eq!(descriptor.port, 8383);
        assert_eq!(descriptor.target_port, 8383);
        assert_eq!(descriptor.protocol, "TCP");
        assert_eq!(descriptor.name, "http-metrics");
    }

    #[test]
    fn test_generate_metrics_service() {
        let svc = generate_metrics_service(
            "vault-operator",
            "vault-system",
            &[MetricsServiceDescriptor::for_port(8383)],
        );

        assert_eq!(svc.metadata.name, Some("vault-operator-metrics".to_string()));
        assert_eq!(svc.metadata.namespace, Some("vault-system".to_string()));

        let spec = svc.spec.unwrap();
        assert_eq!(
            spec.selector.unwrap().get("name"),
            Some(&"vault-operator".to_string())
        );

        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        let port = ports.first().unwrap();
        assert_eq!(port.port, 8383);
        assert_eq!(port.name, Some("http-metrics".to_string()));
        assert_eq!(port.protocol, Some("TCP".to_string()));
        assert_eq!(port.target_port, Some(IntOrString::Int(8383)));
    }
}
