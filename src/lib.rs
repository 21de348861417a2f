//! vault-operator library crate
//!
//! Bootstrap and leader election for the Vault operator: watch scope
//! resolution, health probes, lease-based leadership, the reconciliation
//! manager and publication of the metrics Service.

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod leader;
pub mod manager;
pub mod namespace;
pub mod publisher;
pub mod resources;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use bootstrap::{BootstrapConfig, BootstrapError, BootstrapOrchestrator, Collaborators};
pub use config::Settings;
pub use health::HealthState;
pub use namespace::{NamespaceResolver, ScopeDescriptor};
