//! End-to-end scenarios driving a real `RedbCatalog` through the backup
//! driver, packer, and restore planner with an in-memory fake transport
//! standing in for the HTTP server.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use cvault_catalog_redb::RedbCatalog;
use cvault_core::catalog::CatalogStore;
use cvault_core::config::VaultConfig;
use cvault_core::crypto::KeyDerivation;
use cvault_core::driver::BackupDriver;
use cvault_core::error::{CoreError, CoreResult};
use cvault_core::packer::Uploader;
use cvault_core::progress;
use cvault_core::recovery;
use cvault_core::restore::{self, Downloader, RestoreItem, RestoreTarget};
use cvault_core::session::SessionId;
use zeroize::Zeroizing;

/// Stands in for the HTTP server: shards and catalog snapshots accumulate
/// in memory in upload order.
#[derive(Default)]
struct FakeTransport {
    shards: Mutex<Vec<Vec<u8>>>,
    catalogs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl Uploader for FakeTransport {
    async fn upload_shard(&self, bytes: Vec<u8>, _session_id: &SessionId, _shard_index: u32) -> CoreResult<()> {
        self.shards.lock().unwrap().push(bytes);
        Ok(())
    }

    async fn upload_catalog_snapshot(&self, bytes: Vec<u8>, session_id: &SessionId) -> CoreResult<()> {
        self.catalogs.lock().unwrap().insert(session_id.catalog_name(), bytes);
        Ok(())
    }
}

#[async_trait]
impl Downloader for FakeTransport {
    async fn request_restore(&self, items: &[RestoreItem]) -> CoreResult<Vec<u8>> {
        let wanted: HashSet<String> = items.iter().map(|i| format!("{}.enc", i.path_hash.as_str())).collect();

        // Later-uploaded shards win ties, mirroring a server that always
        // serves the freshest member for a requested hash.
        let mut found: HashMap<String, Vec<u8>> = HashMap::new();
        for shard_bytes in self.shards.lock().unwrap().iter() {
            let mut archive = tar::Archive::new(Cursor::new(shard_bytes.as_slice()));
            let entries = archive
                .entries()
                .map_err(|e| CoreError::Network(format!("fake transport: malformed shard: {e}")))?;
            for entry in entries {
                let mut entry = entry.map_err(|e| CoreError::Network(e.to_string()))?;
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                if wanted.contains(&name) {
                    let mut buf = Vec::new();
                    std::io::Read::read_to_end(&mut entry, &mut buf)
                        .map_err(|e| CoreError::Network(e.to_string()))?;
                    found.insert(name, buf);
                }
            }
        }

        let mut builder = tar::Builder::new(Vec::new());
        for (name, bytes) in &found {
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, bytes.as_slice())
                .map_err(|e| CoreError::Network(e.to_string()))?;
        }
        let tar_bytes = builder.into_inner().map_err(|e| CoreError::Network(e.to_string()))?;

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).map_err(|e| CoreError::Network(e.to_string()))?;
        encoder.finish().map_err(|e| CoreError::Network(e.to_string()))
    }

    async fn list_catalog_snapshots(&self) -> CoreResult<Vec<String>> {
        Ok(self.catalogs.lock().unwrap().keys().cloned().collect())
    }

    async fn download_url(&self, url: &str) -> CoreResult<Vec<u8>> {
        self.catalogs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| CoreError::Network(format!("no such snapshot: {url}")))
    }
}

fn test_config(roots: Vec<PathBuf>, max_shard_bytes: u64) -> VaultConfig {
    VaultConfig {
        server_base_url: "https://example.invalid".to_string(),
        bearer_token: "test-token".to_string(),
        device_id: "test-device".to_string(),
        passphrase: Zeroizing::new("correct horse battery staple".to_string()),
        roots,
        extension_blacklist: Vec::new(),
        max_shard_bytes,
    }
}

async fn run_backup(
    config: &VaultConfig,
    catalog: &RedbCatalog,
    transport: &FakeTransport,
) -> cvault_core::model::CatalogStats {
    let driver = BackupDriver::new();
    let (sink, mut rx) = progress::channel();
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let outcome = driver
        .start(config, &KeyDerivation::Legacy, catalog, transport, sink)
        .await
        .expect("backup session succeeds");
    drain.await.unwrap();

    assert!(!outcome.session_id.is_empty());
    catalog.stats().await.expect("stats query succeeds")
}

#[tokio::test]
async fn empty_directory_first_backup_produces_no_versions() {
    let data_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);

    let stats = run_backup(&config, &catalog, &transport).await;
    assert_eq!(stats.record_count, 0);
}

#[tokio::test]
async fn unchanged_file_is_not_backed_up_twice() {
    let data_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.txt"), b"hello world").unwrap();

    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);

    let first = run_backup(&config, &catalog, &transport).await;
    assert_eq!(first.record_count, 1);

    // A second session with no filesystem changes must add nothing.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    let second = run_backup(&config, &catalog, &transport).await;
    assert_eq!(second.record_count, 1);
    assert_eq!(transport.shards.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn content_change_creates_new_version_and_preserves_history() {
    let data_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    let file_path = source_dir.path().join("notes.txt");
    std::fs::write(&file_path, b"version one").unwrap();

    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);

    run_backup(&config, &catalog, &transport).await;

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    std::fs::write(&file_path, b"version two, longer than before").unwrap();
    let stats = run_backup(&config, &catalog, &transport).await;
    assert_eq!(stats.record_count, 2);

    let history = catalog.history(&file_path).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp > history[1].timestamp, "history is descending by timestamp");
}

#[tokio::test]
async fn time_travel_directory_restore_recovers_earlier_contents() {
    let data_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    let restore_dir = tempfile::tempdir().unwrap();
    let file_path = source_dir.path().join("report.csv");
    std::fs::write(&file_path, b"q1 numbers").unwrap();

    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);

    run_backup(&config, &catalog, &transport).await;
    let checkpoint = chrono::Local::now().fixed_offset();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    std::fs::write(&file_path, b"q2 numbers, revised").unwrap();
    run_backup(&config, &catalog, &transport).await;

    let key = KeyDerivation::Legacy.derive(&config.passphrase);
    let restored = restore::restore(
        &catalog,
        &transport,
        &key,
        RestoreTarget::Directory {
            dir_prefix: source_dir.path(),
        },
        checkpoint,
        Some(restore_dir.path()),
        &|| false,
    )
    .await
    .expect("restore succeeds");

    assert_eq!(restored, 1);
    let restored_path = restore_dir.path().join("report.csv");
    assert_eq!(std::fs::read(restored_path).unwrap(), b"q1 numbers");
}

#[tokio::test]
async fn shard_rollover_splits_large_session_into_multiple_shards() {
    let data_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    for i in 0..30 {
        // Random, not repeated, bytes: gzip would otherwise shrink a
        // same-byte-filled file to nearly nothing and the shard bound
        // would never trip.
        let mut bytes = vec![0u8; 1024 * 1024];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
        std::fs::write(source_dir.path().join(format!("blob{i:02}.bin")), bytes).unwrap();
    }

    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);

    let stats = run_backup(&config, &catalog, &transport).await;
    assert_eq!(stats.record_count, 30);
    assert!(
        transport.shards.lock().unwrap().len() >= 2,
        "30 MiB of content should roll over a 25 MiB shard bound"
    );
}

#[tokio::test]
async fn recovery_rebuilds_an_empty_catalog_from_uploaded_snapshots() {
    let data_dir = tempfile::tempdir().unwrap();
    let recovery_dir = tempfile::tempdir().unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(source_dir.path().join("b.txt"), b"beta").unwrap();

    let catalog = RedbCatalog::open(data_dir.path()).unwrap();
    let transport = FakeTransport::default();
    let config = test_config(vec![source_dir.path().to_path_buf()], 25 * 1024 * 1024);
    run_backup(&config, &catalog, &transport).await;

    let fresh_dir = tempfile::tempdir().unwrap();
    let fresh_catalog = RedbCatalog::open(fresh_dir.path()).unwrap();
    assert_eq!(fresh_catalog.stats().await.unwrap().record_count, 0);

    let key = KeyDerivation::Legacy.derive(&config.passphrase);
    let merged = recovery::recover(&fresh_catalog, &transport, &key, recovery_dir.path())
        .await
        .expect("recovery succeeds");

    assert_eq!(merged, 1);
    assert_eq!(fresh_catalog.stats().await.unwrap().record_count, 2);
}
