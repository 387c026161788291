//! Durability scenarios for the Tessera engine
//!
//! Provider loss, geo-fencing, failover and repair against in-memory
//! providers with fault injection.
//!
//! Run with: cargo test -p tessera-engine --test durability_test

use bytes::Bytes;
use std::sync::Arc;
use tessera_core::error::TesseraError;
use tessera_core::model::{
    AuditAction, Credentials, FileRecord, Principal, Provider, ProviderKind, ShardStatus,
};
use tessera_engine::{Engine, EngineConfig, EngineContext, NewProvider};
use tessera_metadata::{MemoryStore, MetadataStore, PolicyStore};
use std::collections::HashSet;
use tessera_storage::{MemoryTransport, ShardTransport};

struct Harness {
    engine: Engine,
    transport: Arc<MemoryTransport>,
    store: Arc<MemoryStore>,
    admin: Principal,
    alice: Principal,
}

impl Harness {
    fn new() -> Self {
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = EngineContext::new(
            transport.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        Self {
            engine: Engine::new(ctx).unwrap(),
            transport,
            store,
            admin: Principal::admin("root"),
            alice: Principal::user("alice"),
        }
    }

    async fn add_provider(&self, name: &str, region: &str) -> Provider {
        self.engine
            .providers
            .add(
                &self.admin,
                NewProvider {
                    name: name.to_string(),
                    kind: ProviderKind::Minio,
                    endpoint_url: format!("http://{}.local:9000", name),
                    region: region.to_string(),
                    bucket: format!("{}-bucket", name),
                    credentials: Credentials {
                        access_key: "minioadmin".into(),
                        secret_key: "minioadmin".into(),
                    },
                },
            )
            .await
            .unwrap()
    }

    async fn with_providers(count: usize) -> (Self, Vec<Provider>) {
        let harness = Self::new();
        let mut providers = Vec::with_capacity(count);
        for i in 0..count {
            providers.push(harness.add_provider(&format!("p{}", i), "eu-west-1").await);
        }
        (harness, providers)
    }

    async fn upload(&self, data: &[u8]) -> FileRecord {
        self.engine
            .files
            .upload(&self.alice, "report.pdf", Bytes::copy_from_slice(data))
            .await
            .unwrap()
    }
}

fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test]
async fn test_two_providers_down_still_downloads() {
    let (h, providers) = Harness::with_providers(6).await;
    let data = sample(100_000);
    let record = h.upload(&data).await;

    h.transport.set_offline(providers[0].id);
    h.transport.set_offline(providers[4].id);

    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_three_providers_down_is_data_loss() {
    let (h, providers) = Harness::with_providers(6).await;
    let record = h.upload(&sample(10_000)).await;

    for provider in &providers[1..4] {
        h.transport.set_offline(provider.id);
    }

    let err = h
        .engine
        .files
        .download(&h.alice, record.id)
        .await
        .unwrap_err();
    match err {
        TesseraError::CriticalDataLoss {
            file_id,
            available,
            required,
        } => {
            assert_eq!(file_id, record.id);
            assert_eq!(available, 3);
            assert_eq!(required, 4);
        }
        other => panic!("expected CriticalDataLoss, got {:?}", other),
    }
}

#[tokio::test]
async fn test_geo_fence_redirects_shards() {
    let h = Harness::new();
    let a = h.add_provider("aws-frankfurt", "eu-central-1").await;
    let blocked = h.add_provider("aws-beijing", "cn-north-1").await;
    let c = h.add_provider("gcs-virginia", "us-east-1").await;

    h.store
        .update_blocked_regions("alice", vec!["cn-north-1".into()])
        .await
        .unwrap();

    let data = sample(20_000);
    let record = h.upload(&data).await;

    assert_eq!(record.shards.len(), 6);
    assert!(record
        .shards
        .iter()
        .all(|s| s.provider_id == a.id || s.provider_id == c.id));
    assert_eq!(h.transport.object_count(blocked.id), 0);
    assert_eq!(h.transport.object_count(a.id), 3);
    assert_eq!(h.transport.object_count(c.id), 3);

    let redirects: Vec<_> = h
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.action == AuditAction::GeoFenceRedirect)
        .collect();
    assert_eq!(redirects.len(), 1);
    assert!(redirects[0].details.contains("aws-beijing"));

    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_upload_blocked_when_every_region_blocked() {
    let h = Harness::new();
    h.add_provider("aws-beijing", "cn-north-1").await;
    h.engine
        .policies
        .set_blocked_regions(&h.admin, "alice", vec!["cn-north-1".into()])
        .await
        .unwrap();

    let err = h
        .engine
        .files
        .upload(&h.alice, "x", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::UploadBlocked { principal } if principal == "alice"));
    assert_eq!(h.transport.op_counts(), (0, 0, 0));
}

#[tokio::test]
async fn test_failover_to_spare_after_provider_removed() {
    let (h, providers) = Harness::with_providers(6).await;
    let data = sample(50_000);
    let record = h.upload(&data).await;

    let spare = h.add_provider("spare", "eu-west-1").await;
    let lost = record.shard(2).unwrap().provider_id;
    assert_eq!(lost, providers[2].id);
    h.engine.providers.remove(&h.admin, lost).await.unwrap();

    let report = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(report.healthy, 5);
    assert_eq!(report.migrated, 1);
    assert_eq!(report.shards_restored(), 1);

    let stored = h.store.find_by_id(record.id).await.unwrap().unwrap();
    let shard = stored.shard(2).unwrap();
    assert_eq!(shard.provider_id, spare.id);
    assert_eq!(shard.status, ShardStatus::Migrated);
    assert!(!stored.uses_provider(lost));

    // The migrated file survives two more provider losses
    h.transport.set_offline(providers[0].id);
    h.transport.set_offline(providers[1].id);
    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_failover_from_offline_provider() {
    let (h, providers) = Harness::with_providers(6).await;
    let record = h.upload(&sample(8_000)).await;
    let spare = h.add_provider("spare", "eu-west-1").await;

    h.transport.set_offline(providers[3].id);

    let report = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(report.relocations[0].from, providers[3].id);
    assert_eq!(report.relocations[0].to, spare.id);
    assert!(h
        .transport
        .contains(spare.id, &format!("{}/3", record.id)));
}

#[tokio::test]
async fn test_spare_must_respect_owner_policy() {
    let (h, providers) = Harness::with_providers(6).await;
    let record = h.upload(&sample(4_000)).await;
    h.add_provider("aws-beijing", "cn-north-1").await;
    h.engine
        .policies
        .set_blocked_regions(&h.admin, "alice", vec!["cn-north-1".into()])
        .await
        .unwrap();

    h.transport.set_offline(providers[0].id);

    let err = h.engine.repair.repair(record.id).await.unwrap_err();
    assert!(matches!(
        err,
        TesseraError::CriticalCapacityExhausted { shard_index: 0, .. }
    ));
}

#[tokio::test]
async fn test_repair_is_idempotent() {
    let (h, providers) = Harness::with_providers(6).await;
    let record = h.upload(&sample(30_000)).await;

    h.transport.remove_object(providers[1].id, &format!("{}/1", record.id));
    h.transport.drop_bucket(providers[5].id);

    let first = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(first.restored, 2);
    assert_eq!(first.migrated, 0);

    let second = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(second.shards_restored(), 0);
    assert_eq!(second.healthy, 6);
}

#[tokio::test]
async fn test_truncated_shard_is_treated_as_missing() {
    let (h, providers) = Harness::with_providers(6).await;
    let data = sample(10_000);
    let record = h.upload(&data).await;
    let key = format!("{}/0", record.id);
    let expected_len = h
        .transport
        .object_len(&providers[1], &format!("{}/1", record.id))
        .await
        .unwrap();

    h.transport
        .put(&providers[0], &key, Bytes::from_static(b"short"))
        .await
        .unwrap();

    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());

    let report = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(report.healthy, 5);
    assert_eq!(report.restored, 1);
    assert_eq!(report.migrated, 0);
    assert_eq!(
        h.transport.object_len(&providers[0], &key).await,
        Some(expected_len)
    );

    // The restored shard carries its weight again
    h.transport.set_offline(providers[2].id);
    h.transport.set_offline(providers[3].id);
    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_two_removed_holders_move_to_distinct_spares() {
    let (h, providers) = Harness::with_providers(6).await;
    let data = sample(40_000);
    let record = h.upload(&data).await;

    let spare_a = h.add_provider("spare-a", "eu-west-1").await;
    let spare_b = h.add_provider("spare-b", "eu-west-1").await;
    h.engine.providers.remove(&h.admin, providers[1].id).await.unwrap();
    h.engine.providers.remove(&h.admin, providers[4].id).await.unwrap();

    let report = h.engine.repair.repair(record.id).await.unwrap();
    assert_eq!(report.healthy, 4);
    assert_eq!(report.migrated, 2);
    let targets: HashSet<_> = report.relocations.iter().map(|r| r.to).collect();
    assert_eq!(targets, HashSet::from([spare_a.id, spare_b.id]));
    let sources: HashSet<_> = report.relocations.iter().map(|r| r.from).collect();
    assert_eq!(sources, HashSet::from([providers[1].id, providers[4].id]));

    let stored = h.store.find_by_id(record.id).await.unwrap().unwrap();
    let holders: HashSet<_> = stored.shards.iter().map(|s| s.provider_id).collect();
    assert_eq!(holders.len(), 6);

    h.transport.set_offline(providers[0].id);
    h.transport.set_offline(providers[5].id);
    let downloaded = h.engine.files.download(&h.alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_single_repair_is_audited() {
    let (h, _) = Harness::with_providers(6).await;
    let record = h.upload(&sample(2_000)).await;

    h.engine.repair.repair(record.id).await.unwrap();

    let recent = h.engine.audit_log(1).unwrap();
    assert_eq!(recent[0].action, AuditAction::MaintenanceStart);
    assert!(recent[0].details.contains(&record.id.to_string()));
}

#[tokio::test]
async fn test_repair_all_continues_past_failures() {
    let (h, providers) = Harness::with_providers(6).await;
    let doomed = h.upload(&sample(1_000)).await;
    let fine = h.upload(&sample(2_000)).await;

    // `doomed` loses three shards, `fine` only one
    for (i, provider) in providers.iter().enumerate().take(3) {
        h.transport
            .remove_object(provider.id, &format!("{}/{}", doomed.id, i));
    }
    h.transport
        .remove_object(providers[5].id, &format!("{}/5", fine.id));

    let report = h.engine.repair.repair_all().await.unwrap();
    assert_eq!(report.outcomes.len(), 2);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].file_id, doomed.id);
    assert!(matches!(
        failures[0].result,
        Err(TesseraError::CriticalDataLoss { .. })
    ));
    assert_eq!(report.shards_restored(), 1);

    let actions: Vec<AuditAction> = h.store.audit_records().iter().map(|r| r.action).collect();
    assert!(actions.contains(&AuditAction::MaintenanceStart));
    assert!(actions.contains(&AuditAction::ShardRestored));
}

#[tokio::test]
async fn test_disabled_provider_excluded_from_new_uploads() {
    let (h, providers) = Harness::with_providers(3).await;
    h.engine
        .providers
        .set_enabled(&h.admin, providers[1].id, false)
        .await
        .unwrap();

    let record = h.upload(&sample(1_000)).await;
    assert!(!record.uses_provider(providers[1].id));
    assert_eq!(h.transport.object_count(providers[1].id), 0);
}

#[tokio::test]
async fn test_analytics_over_uploaded_files() {
    let (h, _) = Harness::with_providers(6).await;
    h.upload(&sample(4_000)).await;
    h.upload(&sample(2_000)).await;

    let report = h.engine.analytics.compute().await.unwrap();
    assert_eq!(report.file_count, 2);
    assert_eq!(report.total_bytes, 6_000);
    assert_eq!(report.erasure_footprint_bytes, 9_000);
    assert_eq!(report.replication_footprint_bytes, 18_000);
    assert!((report.saving_percent - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_health_reports_offline_provider() {
    let (h, providers) = Harness::with_providers(3).await;
    h.upload(&sample(100)).await;
    h.transport.set_offline(providers[2].id);

    let health = h.engine.health.check_all().await.unwrap();
    assert_eq!(health.online(), 2);
    assert_eq!(health.offline(), 1);
    assert!(!health.is_healthy());
}

#[tokio::test]
async fn test_audit_log_newest_first() {
    let (h, _) = Harness::with_providers(6).await;
    let record = h.upload(&sample(10)).await;
    h.engine.files.delete(&h.alice, record.id).await.unwrap();

    let recent = h.engine.audit_log(2).unwrap();
    assert_eq!(recent[0].action, AuditAction::FileDelete);
    assert_eq!(recent[1].action, AuditAction::FileUpload);
}
