//! Backup driver (C5): orchestrates one session — scan → pack → upload →
//! catalog-commit → catalog-snapshot upload — enforcing singleton
//! execution and monotonic session timestamps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset};
use tracing::info;

use crate::catalog::CatalogStore;
use crate::config::VaultConfig;
use crate::crypto::{KeyDerivation, VaultKey};
use crate::error::{CoreError, CoreResult};
use crate::packer::{self, PackProgress, Uploader};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::scanner::{self, ExtensionBlacklist, ScanCounters};
use crate::session::SessionId;
use crate::singleton::SessionGuard;

/// Outcome of one completed (non-cancelled, non-failed) session.
#[derive(Clone, Debug, Default)]
pub struct SessionOutcome {
    pub session_id: String,
    pub files_scanned: u64,
    pub files_unchanged: u64,
    pub files_backed_up: u64,
}

pub struct BackupDriver {
    guard: SessionGuard,
    last_session_t: Arc<Mutex<Option<DateTime<FixedOffset>>>>,
    current_stop: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl Default for BackupDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupDriver {
    pub fn new() -> Self {
        Self {
            guard: SessionGuard::new(),
            last_session_t: Arc::new(Mutex::new(None)),
            current_stop: Arc::new(Mutex::new(None)),
        }
    }

    /// `true` iff a session is currently running.
    pub fn is_running(&self) -> bool {
        self.current_stop.lock().expect("mutex poisoned").is_some()
    }

    /// Runs one backup session to completion. Fails immediately with
    /// [`CoreError::Busy`] if another session is already active.
    pub async fn start(
        &self,
        config: &VaultConfig,
        key_derivation: &KeyDerivation,
        catalog: &dyn CatalogStore,
        uploader: &dyn Uploader,
        progress: ProgressSink,
    ) -> CoreResult<SessionOutcome> {
        let session = self.guard.try_acquire()?;
        let stop_flag = session.stop_flag();
        *self.current_stop.lock().expect("mutex poisoned") = Some(stop_flag.clone());
        let should_stop = move || stop_flag.load(Ordering::Relaxed);

        let result = self
            .run_session(config, key_derivation, catalog, uploader, &progress, &should_stop)
            .await;

        *self.current_stop.lock().expect("mutex poisoned") = None;
        drop(session);

        match &result {
            Ok(_) => progress.emit(ProgressEvent::phase_only(Phase::Complete)),
            Err(CoreError::Cancelled) => progress.emit(ProgressEvent::phase_only(Phase::Cancelled)),
            Err(_) => progress.emit(ProgressEvent::phase_only(Phase::Failed)),
        }
        result
    }

    /// Requests cooperative cancellation of the currently running session,
    /// if any. A no-op if no session is active.
    pub fn request_stop(&self) {
        if let Some(flag) = self.current_stop.lock().expect("mutex poisoned").as_ref() {
            flag.store(true, Ordering::Relaxed);
        }
    }

    async fn run_session(
        &self,
        config: &VaultConfig,
        key_derivation: &KeyDerivation,
        catalog: &dyn CatalogStore,
        uploader: &dyn Uploader,
        progress: &ProgressSink,
        should_stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> CoreResult<SessionOutcome> {
        progress.emit(ProgressEvent::phase_only(Phase::Starting));
        config
            .validate_for_backup()
            .map_err(|e| CoreError::Catalog(anyhow::anyhow!(e)))?;

        let session_t = self.allocate_session_timestamp().await;
        let session_id = SessionId::from_timestamp(session_t);
        info!(%session_id, "session starting");

        let key = key_derivation.derive(&config.passphrase);

        progress.emit(ProgressEvent::phase_only(Phase::Scanning));
        let counters = Arc::new(ScanCounters::default());
        let blacklist = ExtensionBlacklist::new(config.extension_blacklist.iter().cloned());
        let progress_for_scan = progress.clone();
        let changes = scanner::scan(
            catalog,
            &config.roots,
            &blacklist,
            counters.clone(),
            should_stop,
            |scanned, _unchanged, to_backup| {
                progress_for_scan.emit(ProgressEvent {
                    phase: Phase::Scanning,
                    current_file: None,
                    total_files: scanned,
                    done_files: scanned,
                    total_bytes: 0,
                    done_bytes: to_backup,
                });
            },
        )
        .await?;

        if should_stop() {
            return Err(CoreError::Cancelled);
        }

        progress.emit(ProgressEvent::phase_only(Phase::Encrypting));
        let progress_for_pack = progress.clone();
        let pending = packer::pack_and_upload(
            changes,
            session_t,
            &key,
            uploader,
            config.max_shard_bytes,
            should_stop,
            move |p: PackProgress| {
                progress_for_pack.emit(ProgressEvent {
                    phase: Phase::Uploading,
                    current_file: None,
                    total_files: p.total_files,
                    done_files: p.done_files,
                    total_bytes: p.total_bytes,
                    done_bytes: p.done_bytes,
                });
            },
        )
        .await?;

        let files_backed_up = pending.len() as u64;

        progress.emit(ProgressEvent::phase_only(Phase::UpdatingCatalog));
        catalog.add_entries(pending).await?;
        info!(files_backed_up, "catalog commit complete");

        progress.emit(ProgressEvent::phase_only(Phase::UploadingCatalog));
        let snapshot_path = std::env::temp_dir().join(format!("{session_id}.catalog.snapshot"));
        catalog.export_snapshot(&snapshot_path).await?;
        let snapshot_bytes = std::fs::read(&snapshot_path)
            .map_err(|e| CoreError::filesystem(&snapshot_path, e))?;
        let _ = std::fs::remove_file(&snapshot_path);
        packer::upload_catalog_snapshot(&snapshot_bytes, &key, &session_id, uploader).await?;

        let (scanned, unchanged, _to_backup) = counters.snapshot();
        Ok(SessionOutcome {
            session_id: session_id.as_str().to_string(),
            files_scanned: scanned,
            files_unchanged: unchanged,
            files_backed_up,
        })
    }

    /// Picks this session's shared timestamp, sleeping in small increments
    /// if necessary so that it differs from the previous session by at
    /// least one whole second.
    async fn allocate_session_timestamp(&self) -> DateTime<FixedOffset> {
        loop {
            let now = chrono::Local::now().fixed_offset();
            let mut last = self.last_session_t.lock().expect("mutex poisoned");
            let distinct = match *last {
                Some(prev) => now.timestamp() > prev.timestamp(),
                None => true,
            };
            if distinct {
                *last = Some(now);
                return now;
            }
            drop(last);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}
