//! Leader election against a real Lease.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::coordination::v1::Lease;
use vault_operator::leader::{LeaderElector, LeaseBackend, LockBackend};

use crate::{TestNamespace, init_tracing, test_client};

const LOCK_NAME: &str = "vault-operator-lock";

fn backend(client: kube::Client, namespace: &str, holder: &str) -> Arc<LeaseBackend> {
    Arc::new(LeaseBackend::new(
        client,
        namespace,
        LOCK_NAME,
        holder,
        Duration::from_secs(3),
    ))
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_acquire_creates_lease() {
    init_tracing();
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "vault-leader").await;

    let elector = LeaderElector::new(
        backend(client, ns.name(), "instance-a"),
        LOCK_NAME,
        "instance-a",
        Duration::from_secs(1),
    );
    let _leadership = tokio::time::timeout(Duration::from_secs(10), elector.acquire())
        .await
        .expect("acquire timed out")
        .expect("acquire failed");

    let lease = ns.api::<Lease>().get(LOCK_NAME).await.unwrap();
    let holder = lease.spec.and_then(|s| s.holder_identity);
    assert_eq!(holder.as_deref(), Some("instance-a"));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires Kubernetes cluster"]
async fn test_second_instance_waits_for_expiry() {
    init_tracing();
    let client = test_client().await;
    let ns = TestNamespace::create(client.clone(), "vault-leader").await;

    let first = LeaderElector::new(
        backend(client.clone(), ns.name(), "instance-a"),
        LOCK_NAME,
        "instance-a",
        Duration::from_secs(1),
    );
    let leadership = first.acquire().await.unwrap();

    let contender = backend(client.clone(), ns.name(), "instance-b");
    assert!(!contender.try_acquire_or_renew().await.unwrap());

    let second = LeaderElector::new(contender, LOCK_NAME, "instance-b", Duration::from_secs(1));
    let waiting = tokio::spawn(async move { second.acquire().await.map(|_| ()) });

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!waiting.is_finished(), "contender acquired a held lease");

    // Stop renewing; the lease expires after its TTL
    drop(leadership);
    tokio::time::timeout(Duration::from_secs(15), waiting)
        .await
        .expect("contender never acquired the lease")
        .unwrap()
        .unwrap();
}
