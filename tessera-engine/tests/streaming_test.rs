//! Streaming upload and download through the engine
//!
//! Uses small windows so multi-window files stay cheap, and a sled-backed
//! store to check that window sizes survive a reopen.
//!
//! Run with: cargo test -p tessera-engine --test streaming_test

use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use tessera_core::error::TesseraError;
use tessera_core::model::{Credentials, Principal, Provider, ProviderKind};
use tessera_engine::{Engine, EngineConfig, EngineContext, NewProvider};
use tessera_metadata::{MetadataStore, SledStore};
use tessera_storage::MemoryTransport;

const WINDOW: usize = 4096;

fn config() -> EngineConfig {
    EngineConfig {
        stream_window_size: WINDOW,
        ..EngineConfig::default()
    }
}

fn generate_file(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

async fn engine_over(
    store: Arc<SledStore>,
    transport: Arc<MemoryTransport>,
) -> Engine {
    let ctx = EngineContext::new(
        transport,
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        config(),
    )
    .unwrap();
    Engine::new(ctx).unwrap()
}

async fn register(engine: &Engine, count: usize) -> Vec<Provider> {
    let admin = Principal::admin("root");
    let mut providers = Vec::new();
    for i in 0..count {
        providers.push(
            engine
                .providers
                .add(
                    &admin,
                    NewProvider {
                        name: format!("minio-{}", i),
                        kind: ProviderKind::Minio,
                        endpoint_url: "http://localhost:9000".into(),
                        region: "eu-west-1".into(),
                        bucket: format!("tessera-{}", i),
                        credentials: Credentials {
                            access_key: "a".into(),
                            secret_key: "s".into(),
                        },
                    },
                )
                .await
                .unwrap(),
        );
    }
    providers
}

#[tokio::test]
async fn test_stream_roundtrip_multi_window() {
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let engine = engine_over(store, transport.clone()).await;
    let providers = register(&engine, 6).await;
    let alice = Principal::user("alice");

    let data = generate_file(3 * WINDOW + 1000);
    let record = engine
        .files
        .upload_stream(&alice, "video.mp4", data.as_slice())
        .await
        .unwrap();

    assert_eq!(record.size, data.len() as u64);
    assert_eq!(
        record.encrypted_sizes,
        vec![WINDOW as u64, WINDOW as u64, WINDOW as u64, 1008]
    );
    assert_eq!(record.encrypted_size(), 3 * WINDOW as u64 + 1008);

    // Multi-window objects are keyed by window, then shard
    for window in 0..4 {
        let key = format!("{}/{}/0", record.id, window);
        assert!(transport.contains(providers[0].id, &key));
    }
    assert_eq!(transport.object_count(providers[0].id), 4);

    let mut out = Vec::new();
    engine
        .files
        .download_to(&alice, record.id, &mut out)
        .await
        .unwrap();
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_stream_matches_whole_buffer_download() {
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let engine = engine_over(store, transport.clone()).await;
    let providers = register(&engine, 6).await;
    let alice = Principal::user("alice");

    // Exactly one window of plaintext pushes the padding block into a second window
    let data = generate_file(WINDOW);
    let record = engine
        .files
        .upload_stream(&alice, "aligned.bin", data.as_slice())
        .await
        .unwrap();
    assert_eq!(record.encrypted_sizes, vec![WINDOW as u64, 16]);

    transport.set_offline(providers[1].id);
    transport.set_offline(providers[2].id);

    let downloaded = engine.files.download(&alice, record.id).await.unwrap();
    assert_eq!(downloaded, Bytes::from(data));
}

#[tokio::test]
async fn test_small_stream_uses_single_window_keys() {
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let engine = engine_over(store, transport.clone()).await;
    let providers = register(&engine, 6).await;

    let record = engine
        .files
        .upload_stream(&Principal::user("alice"), "note.txt", &b"hello"[..])
        .await
        .unwrap();

    assert_eq!(record.window_count(), 1);
    assert!(transport.contains(providers[4].id, &format!("{}/4", record.id)));
}

#[tokio::test]
async fn test_repair_multi_window_file() {
    let store = Arc::new(SledStore::open_temporary().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let engine = engine_over(store, transport.clone()).await;
    let providers = register(&engine, 7).await;
    let alice = Principal::user("alice");

    let data = generate_file(2 * WINDOW + 10);
    let record = engine
        .files
        .upload_stream(&alice, "big.bin", data.as_slice())
        .await
        .unwrap();

    // Seven providers with six shards: the seventh is a spare
    let lost = record.shard(0).unwrap().provider_id;
    engine
        .providers
        .remove(&Principal::admin("root"), lost)
        .await
        .unwrap();

    let report = engine.repair.repair(record.id).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(report.relocations[0].to, providers[6].id);
    for window in 0..record.window_count() {
        assert!(transport.contains(providers[6].id, &format!("{}/{}/0", record.id, window)));
    }

    let downloaded = engine.files.download(&alice, record.id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MemoryTransport::new());
    let alice = Principal::user("alice");
    let data = generate_file(WINDOW + 500);

    let file_id = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = engine_over(store.clone(), transport.clone()).await;
        register(&engine, 6).await;
        let record = engine
            .files
            .upload_stream(&alice, "persist.bin", data.as_slice())
            .await
            .unwrap();
        store.flush().unwrap();
        record.id
    };

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let stored = store.find_by_id(file_id).await.unwrap().unwrap();
    assert_eq!(stored.window_count(), 2);

    let engine = engine_over(store, transport).await;
    let downloaded = engine.files.download(&alice, file_id).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());

    let err = engine
        .files
        .download(&Principal::user("mallory"), file_id)
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::AccessDenied { .. }));
}
