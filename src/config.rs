//! Command-line and environment configuration for the operator process.
//!
//! Every flag can also be supplied through the environment, which is how the
//! Deployment manifest usually wires the downward API into the operator.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Default reconciliation interval
pub const DEFAULT_SYNC_PERIOD: &str = "30s";
/// Default liveness/readiness listener
pub const DEFAULT_HEALTH_PROBE_ADDR: &str = "0.0.0.0:8080";
/// Default host the manager binds its metrics listener to
pub const DEFAULT_METRICS_HOST: &str = "0.0.0.0";
/// Default metrics port, also published through the metrics Service
pub const DEFAULT_METRICS_PORT: u16 = 8383;
/// Name of the cluster-wide leader lock
pub const DEFAULT_LOCK_NAME: &str = "vault-operator-lock";
/// Operator name used for the metrics Service and its selector
pub const DEFAULT_OPERATOR_NAME: &str = "vault-operator";

/// Startup settings for vault-operator
#[derive(Parser, Debug, Clone)]
#[command(name = "vault-operator", version, about, long_about = None)]
pub struct Settings {
    /// Minimum frequency at which watched resources are reconciled
    #[arg(long, env = "SYNC_PERIOD", default_value = DEFAULT_SYNC_PERIOD, value_parser = parse_duration)]
    pub sync_period: Duration,

    /// Enable verbose logging
    #[arg(long, env = "VERBOSE")]
    pub verbose: bool,

    /// Explicit namespace to watch; empty or unset falls back to discovery
    #[arg(long, env = "OPERATOR_NAMESPACE")]
    pub operator_namespace: Option<String>,

    /// Address the liveness and readiness probes listen on
    #[arg(long, default_value = DEFAULT_HEALTH_PROBE_ADDR)]
    pub health_probe_bind_address: SocketAddr,

    /// Host the metrics endpoint binds to
    #[arg(long, default_value = DEFAULT_METRICS_HOST)]
    pub metrics_host: String,

    /// Port the metrics endpoint binds to
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Name of the leader election lease
    #[arg(long, default_value = DEFAULT_LOCK_NAME)]
    pub lock_name: String,

    /// Operator name, used to name and select the metrics Service
    #[arg(long, env = "OPERATOR_NAME", default_value = DEFAULT_OPERATOR_NAME)]
    pub operator_name: String,

    /// Identity of this instance in leader election (defaults to the hostname)
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Namespace the operator itself runs in
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,

    /// How long a lease stays valid without renewal
    #[arg(long, default_value = "15s", value_parser = parse_duration)]
    pub lease_ttl: Duration,

    /// How often the lease is renewed, and how often contenders retry.
    /// At most half of `lease_ttl`.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub lease_renew_interval: Duration,
}

impl Settings {
    /// `host:port` the manager serves metrics on
    pub fn metrics_bind_address(&self) -> String {
        format!("{}:{}", self.metrics_host, self.metrics_port)
    }
}

/// Parse a Go-style duration such as `30s`, `500ms`, `1.5h` or `1h30m`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. Each component
/// may carry a decimal fraction. Zero durations are rejected since a zero
/// sync period or lease interval would spin.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_nanos: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(format!("expected a number in duration '{input}'"));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|e| format!("invalid number in duration '{input}': {e}"))?
        };
        // Digits past nanosecond precision of an hour cannot change the result
        let fraction = fraction.get(..fraction.len().min(18)).unwrap_or_default();
        let fraction_nanos = if fraction.is_empty() {
            0
        } else {
            let digits: u128 = fraction
                .parse()
                .map_err(|e| format!("invalid fraction in duration '{input}': {e}"))?;
            digits * unit_nanos / 10u128.pow(fraction.len() as u32)
        };

        total_nanos = whole
            .checked_mul(unit_nanos)
            .and_then(|n| n.checked_add(fraction_nanos))
            .and_then(|n| n.checked_add(total_nanos))
            .ok_or_else(|| format!("duration '{input}' is too large"))?;
        rest = next;
    }

    if total_nanos == 0 {
        return Err(format!("duration '{input}' must be greater than zero"));
    }
    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration '{input}' is too large"))?;
    let nanos = (total_nanos % 1_000_000_000) as u32;
    Ok(Duration::new(secs, nanos))
}
