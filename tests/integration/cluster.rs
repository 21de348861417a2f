//! Shared test cluster connection.

use std::sync::OnceLock;

use kube::{Client, Config};
use tokio::sync::OnceCell;

/// Set once connectivity has been checked
static CONNECTIVITY: OnceCell<()> = OnceCell::const_new();

/// Create a client from the local kubeconfig.
///
/// The first call checks that the API server answers, so a missing cluster
/// fails every test with the same clear message.
pub async fn test_client() -> Client {
    CONNECTIVITY
        .get_or_init(|| async {
            let client = new_client().await;
            let version = client.apiserver_version().await.expect(
                "Failed to connect to Kubernetes cluster. Is your kubeconfig configured?",
            );
            tracing::info!(
                "Connected to Kubernetes cluster: {} {}",
                version.platform,
                version.git_version
            );
        })
        .await;
    new_client().await
}

async fn new_client() -> Client {
    let config = Config::infer().await.expect("Failed to infer kube config");
    Client::try_from(config).expect("Failed to create kube client")
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing for tests (optional, call once).
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    });
}
