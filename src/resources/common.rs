//! Common resource generation utilities.

use std::collections::BTreeMap;

/// Label selecting the operator's own pods
pub const OPERATOR_NAME_LABEL: &str = "name";

/// Labels applied to resources that describe the operator itself.
///
/// Also used as the pod selector, so they must match the operator
/// Deployment's pod template labels.
pub fn operator_labels(operator_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(OPERATOR_NAME_LABEL.to_string(), operator_name.to_string());
    labels
}

/// Name of the Service exposing the operator's metrics
pub fn metrics_service_name(operator_name: &str) -> String {
    format!("{operator_name}-metrics")
}
