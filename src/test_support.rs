//! Helpers shared by unit tests.

/// Build a Kubernetes API error with the given status code
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(
        kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} (simulated)"),
            reason: reason.to_string(),
            code,
        }
        .into(),
    )
}

/// A client pointed at an address nothing listens on.
///
/// Must be created inside a tokio runtime.
#[allow(clippy::unwrap_used)]
pub fn offline_client() -> kube::Client {
    let config = kube::Config::new("http://127.0.0.1:9".parse().unwrap());
    kube::Client::try_from(config).unwrap()
}
