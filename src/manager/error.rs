//! Error types for the reconciliation manager.

use thiserror::Error;

use super::lifecycle::{ManagerEvent, ManagerPhase};

/// Failure reported by a scheme builder
#[derive(Error, Debug)]
pub enum SchemeError {
    /// The same kind was registered twice with different definitions
    #[error("conflicting registration for {api_version}/{kind}: plural {existing} vs {requested}")]
    Conflict {
        api_version: String,
        kind: String,
        existing: String,
        requested: String,
    },

    /// Any other scheme builder failure
    #[error("{0}")]
    Failed(String),
}

/// Failure reported by a controller registrar
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The controller watches a type the scheme does not know
    #[error("type {0} is not registered in the scheme")]
    TypeNotRegistered(String),

    /// Any other registration failure
    #[error("{0}")]
    Failed(String),
}

/// Error type for manager lifecycle operations
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Manager configuration is unusable
    #[error("invalid manager configuration: {0}")]
    InvalidConfig(String),

    /// Scheme registration failed
    #[error("scheme registration failed: {0}")]
    Scheme(#[from] SchemeError),

    /// Controller registration failed
    #[error("controller registration failed: {0}")]
    Controller(#[from] ControllerError),

    /// A lifecycle step was attempted out of order
    #[error("cannot apply {event} in phase {current}")]
    InvalidTransition {
        current: ManagerPhase,
        event: ManagerEvent,
    },

    /// The metrics listener could not be bound
    #[error("failed to bind metrics listener on {address}: {source}")]
    MetricsBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A runnable failed while the manager was running
    #[error("runnable {name} failed: {message}")]
    RunnableFailed { name: String, message: String },

    /// The run loop ended abnormally
    #[error("run loop error: {0}")]
    RunLoop(String),
}

/// Result type alias for manager operations
pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
