//! Structured logging setup.

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build the log filter. `RUST_LOG` takes precedence over the defaults.
pub fn env_filter(verbose: bool) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    let operator_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("vault_operator={operator_level}").parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("kube_leader_election=info".parse()?);
    Ok(filter)
}

/// Install the process-wide JSON subscriber.
///
/// Must be called once, before any other component logs.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose)?)
        .json()
        .try_init()
}

/// Log build and platform information
pub fn log_version_info() {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "Starting vault-operator"
    );
}
