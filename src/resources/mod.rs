//! Resource generation module.
//!
//! Contains generators for the Kubernetes objects the operator creates for
//! itself, as opposed to the objects its controllers manage.

pub mod common;
pub mod services;

pub use services::{MetricsServiceDescriptor, OPERATOR_PORT_NAME, generate_metrics_service};
