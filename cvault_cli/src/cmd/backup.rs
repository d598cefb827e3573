use std::path::Path;

use anyhow::Result;
use cvault_catalog_redb::RedbCatalog;
use cvault_core::config::VaultConfig;
use cvault_core::driver::BackupDriver;
use cvault_core::progress::{Phase, ProgressEvent};
use tracing::info;

pub async fn run(config_file: &Path, vault_config: &VaultConfig, catalog: &RedbCatalog) -> Result<()> {
    let key_derivation = crate::config_store::load_key_derivation(config_file)?;
    let uploader = crate::cmd::http_transport(vault_config)?;

    let driver = BackupDriver::new();
    let (sink, mut progress_rx) = cvault_core::progress::channel();

    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            print_progress(&event);
        }
    });

    let backup = driver.start(vault_config, &key_derivation, catalog, &uploader, sink);
    tokio::pin!(backup);

    let outcome = tokio::select! {
        result = &mut backup => result,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, requesting cancellation");
            driver.request_stop();
            backup.await
        }
    }?;

    let _ = progress_task.await;

    info!(
        session_id = %outcome.session_id,
        files_scanned = outcome.files_scanned,
        files_unchanged = outcome.files_unchanged,
        files_backed_up = outcome.files_backed_up,
        "backup session complete"
    );
    println!(
        "session {}: {} scanned, {} unchanged, {} backed up",
        outcome.session_id, outcome.files_scanned, outcome.files_unchanged, outcome.files_backed_up
    );
    Ok(())
}

fn print_progress(event: &ProgressEvent) {
    match event.phase {
        Phase::Scanning => println!("scanning… {} files seen", event.total_files),
        Phase::Uploading => println!(
            "uploading… {}/{} files ({:.1}%)",
            event.done_files,
            event.total_files,
            event.percent()
        ),
        Phase::Complete => println!("done"),
        Phase::Cancelled => println!("cancelled"),
        Phase::Failed => println!("failed"),
        _ => {}
    }
}
