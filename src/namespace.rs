//! Watch scope resolution.
//!
//! The scope is either a single namespace or the whole cluster (empty string).
//! Resolution never fails: when no namespace can be determined the operator
//! watches every namespace and says so in the logs.

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable the downward API populates with the watch namespace
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";

/// Namespace file mounted with the pod's service account token
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Why a namespace source could not produce a namespace
#[derive(Debug, Error)]
pub enum NamespaceDiscoveryError {
    /// The source has nothing to offer
    #[error("{0} is not set")]
    NotSet(String),

    /// The source exists but could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The set of resources one operator instance watches.
///
/// An empty value means cluster-wide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScopeDescriptor(String);

impl ScopeDescriptor {
    /// Scope covering every namespace
    pub fn cluster_wide() -> Self {
        Self(String::new())
    }

    /// Scope restricted to one namespace
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self(namespace.into())
    }

    /// Whether this scope covers the whole cluster
    pub fn is_cluster_wide(&self) -> bool {
        self.0.is_empty()
    }

    /// The namespace, or `None` when cluster-wide
    pub fn namespace(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cluster_wide() {
            write!(f, "cluster-wide")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A platform mechanism that knows which namespace to watch
#[cfg_attr(test, automock)]
pub trait WatchNamespaceSource: Send + Sync {
    /// Discover the namespace, or explain why it is unknown
    fn discover(&self) -> Result<String, NamespaceDiscoveryError>;
}

/// Reads the watch namespace injected by the downward API
#[derive(Debug, Clone, Copy, Default)]
pub struct DownwardApi;

impl WatchNamespaceSource for DownwardApi {
    fn discover(&self) -> Result<String, NamespaceDiscoveryError> {
        match std::env::var(WATCH_NAMESPACE_ENV) {
            Ok(ns) => Ok(ns),
            Err(_) => Err(NamespaceDiscoveryError::NotSet(
                WATCH_NAMESPACE_ENV.to_string(),
            )),
        }
    }
}

/// Reads the namespace of the pod's service account
#[derive(Debug, Clone)]
pub struct ServiceAccountNamespace {
    path: PathBuf,
}

impl Default for ServiceAccountNamespace {
    fn default() -> Self {
        Self::new(SERVICE_ACCOUNT_NAMESPACE_PATH)
    }
}

impl ServiceAccountNamespace {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl WatchNamespaceSource for ServiceAccountNamespace {
    fn discover(&self) -> Result<String, NamespaceDiscoveryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let ns = contents.trim();
                if ns.is_empty() {
                    Err(NamespaceDiscoveryError::NotSet(
                        self.path.display().to_string(),
                    ))
                } else {
                    Ok(ns.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                NamespaceDiscoveryError::NotSet(self.path.display().to_string()),
            ),
            Err(source) => Err(NamespaceDiscoveryError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Resolves the watch scope from an explicit override, then discovery
pub struct NamespaceResolver<D = DownwardApi> {
    override_namespace: Option<String>,
    discovery: D,
}

impl NamespaceResolver<DownwardApi> {
    /// Resolver using the downward API as the discovery mechanism
    pub fn new(override_namespace: Option<String>) -> Self {
        Self::with_discovery(override_namespace, DownwardApi)
    }
}

impl<D: WatchNamespaceSource> NamespaceResolver<D> {
    pub fn with_discovery(override_namespace: Option<String>, discovery: D) -> Self {
        Self {
            override_namespace,
            discovery,
        }
    }

    /// Determine the watch scope.
    ///
    /// Precedence: non-empty override, then discovery, then cluster-wide.
    pub fn resolve(&self) -> ScopeDescriptor {
        if let Some(ns) = self.override_namespace.as_deref()
            && !ns.is_empty()
        {
            info!(namespace = %ns, "Watched namespace set by override");
            return ScopeDescriptor::namespaced(ns);
        }

        let scope = match self.discovery.discover() {
            Ok(ns) => {
                debug!(namespace = %ns, "Watched namespace discovered");
                ScopeDescriptor::namespaced(ns)
            }
            Err(e @ NamespaceDiscoveryError::Read { .. }) => {
                warn!(error = %e, "Namespace discovery failed");
                info!("No watched namespace found, watching the entire cluster");
                ScopeDescriptor::cluster_wide()
            }
            Err(e) => {
                debug!(reason = %e, "Namespace discovery found nothing");
                info!("No watched namespace found, watching the entire cluster");
                ScopeDescriptor::cluster_wide()
            }
        };
        info!(scope = %scope, "Watched namespace");
        scope
    }
}

/// Namespace the operator itself runs in, used for the lease and the
/// metrics Service. Falls back to `default` with a warning.
pub fn operator_namespace(explicit: Option<&str>) -> String {
    if let Some(ns) = explicit
        && !ns.is_empty()
    {
        return ns.to_string();
    }
    match ServiceAccountNamespace::default().discover() {
        Ok(ns) => ns,
        Err(e) => {
            warn!(reason = %e, "POD_NAMESPACE not set, using 'default'");
            "default".to_string()
        }
    }
}
