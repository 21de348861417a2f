//! Leader election using Kubernetes Leases.
//!
//! Only one operator instance may reconcile at a time. `LeaderElector::acquire`
//! blocks until this instance holds the lease; instances that lose the race
//! keep retrying until the holder stops renewing. A lease API error while
//! contending is fatal: proceeding without the lock is never an option.
//!
//! The lease is never released explicitly. When the process exits the lease
//! stops being renewed and expires after its TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Lease API error
    #[error("lease error: {0}")]
    Lease(#[from] kube_leader_election::Error),

    /// Kubernetes API error
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Renewal is too slow for the lease to stay live between renewals
    #[error("lease renew interval {renew:?} must be at most half of the lease TTL {ttl:?}")]
    LeaseTiming { ttl: Duration, renew: Duration },
}

/// Check that the holder renews well before its lease lapses.
///
/// A renew interval of at most half the TTL leaves one missed renewal of
/// slack. Anything slower lets a contender claim an expired lease while the
/// holder still believes it leads.
pub fn check_lease_timing(ttl: Duration, renew: Duration) -> Result<(), LeaderElectionError> {
    if renew.is_zero() || renew.saturating_mul(2) > ttl {
        return Err(LeaderElectionError::LeaseTiming { ttl, renew });
    }
    Ok(())
}

/// Why leadership ended while the operator was running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipLost {
    /// Another instance holds the lease now
    Superseded,
    /// The lease could not be renewed
    RenewalFailed(String),
}

impl std::fmt::Display for LeadershipLost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadershipLost::Superseded => write!(f, "lease acquired by another instance"),
            LeadershipLost::RenewalFailed(e) => write!(f, "lease renewal failed: {e}"),
        }
    }
}

/// A cluster-visible mutual exclusion record
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Claim the lock, or renew it if already held.
    ///
    /// Returns `Ok(false)` while another holder's claim is live.
    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError>;
}

/// Lock backed by a `coordination.k8s.io/v1` Lease
pub struct LeaseBackend {
    lock: LeaseLock,
}

impl LeaseBackend {
    pub fn new(
        client: Client,
        namespace: &str,
        lease_name: &str,
        holder_id: &str,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            lock: LeaseLock::new(
                client,
                namespace,
                LeaseLockParams {
                    holder_id: holder_id.to_string(),
                    lease_name: lease_name.to_string(),
                    lease_ttl,
                },
            ),
        }
    }
}

#[async_trait]
impl LockBackend for LeaseBackend {
    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let result = self.lock.try_acquire_or_renew().await?;
        Ok(result.acquired_lease)
    }
}

/// Acquires and holds the operator's leader lock
pub struct LeaderElector<B: ?Sized = dyn LockBackend> {
    backend: Arc<B>,
    lock_name: String,
    identity: String,
    retry_interval: Duration,
}

impl<B: LockBackend + ?Sized + 'static> LeaderElector<B> {
    /// `retry_interval` is both the contention retry and the renewal period
    pub fn new(backend: Arc<B>, lock_name: &str, identity: &str, retry_interval: Duration) -> Self {
        Self {
            backend,
            lock_name: lock_name.to_string(),
            identity: identity.to_string(),
            retry_interval,
        }
    }

    /// Block until this instance holds the lock.
    ///
    /// Returns a [`Leadership`] handle that keeps renewing the lock in the
    /// background until it is dropped.
    pub async fn acquire(&self) -> Result<Leadership, LeaderElectionError> {
        info!(
            holder_id = %self.identity,
            lock = %self.lock_name,
            "Waiting to acquire leadership..."
        );

        loop {
            if self.backend.try_acquire_or_renew().await? {
                info!(holder_id = %self.identity, lock = %self.lock_name, "Acquired leadership");
                break;
            }
            debug!(
                holder_id = %self.identity,
                retry_secs = self.retry_interval.as_secs_f64(),
                "Another instance is leader, waiting..."
            );
            tokio::time::sleep(self.retry_interval).await;
        }

        Ok(self.hold())
    }

    fn hold(&self) -> Leadership {
        let (lost_tx, lost_rx) = oneshot::channel();
        let backend = Arc::clone(&self.backend);
        let identity = self.identity.clone();
        let interval = self.retry_interval;

        let renewal = tokio::spawn(async move {
            let reason = loop {
                tokio::time::sleep(interval).await;
                match backend.try_acquire_or_renew().await {
                    Ok(true) => debug!(holder_id = %identity, "Lease renewed"),
                    Ok(false) => break LeadershipLost::Superseded,
                    Err(e) => break LeadershipLost::RenewalFailed(e.to_string()),
                }
            };
            error!(holder_id = %identity, reason = %reason, "Lost leadership");
            let _ = lost_tx.send(reason);
        });

        Leadership {
            renewal,
            lost_rx: Some(lost_rx),
        }
    }
}

/// Held leadership. Renewal stops when this is dropped.
#[derive(Debug)]
pub struct Leadership {
    renewal: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<LeadershipLost>>,
}

impl Leadership {
    /// Resolve once leadership is lost
    pub async fn lost(&mut self) -> LeadershipLost {
        match self.lost_rx.take() {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                LeadershipLost::RenewalFailed("renewal task ended unexpectedly".to_string())
            }),
            None => std::future::pending().await,
        }
    }
}

impl Drop for Leadership {
    fn drop(&mut self) {
        self.renewal.abort();
    }
}
