use std::path::Path;

use anyhow::Result;
use cvault_catalog_redb::RedbCatalog;
use cvault_core::catalog::CatalogStore;

pub async fn run_list(catalog: &RedbCatalog) -> Result<()> {
    let mut files = catalog.files_with_info().await?;
    files.sort_by(|a, b| a.orig_path.cmp(&b.orig_path));
    for f in files {
        println!(
            "{}\t{} versions\tlatest {}\t{} bytes",
            f.orig_path.display(),
            f.version_count,
            f.latest_timestamp.to_rfc3339(),
            f.latest_size
        );
    }
    Ok(())
}

pub async fn run_history(catalog: &RedbCatalog, path: &Path) -> Result<()> {
    let history = catalog.history(path).await?;
    if history.is_empty() {
        println!("no versions found for {}", path.display());
        return Ok(());
    }
    for entry in history {
        println!(
            "{}\t{}\t{} bytes",
            entry.timestamp.to_rfc3339(),
            entry.content_hash,
            entry.plain_size
        );
    }
    Ok(())
}

pub async fn run_status(catalog: &RedbCatalog) -> Result<()> {
    let stats = catalog.stats().await?;
    println!("records:          {}", stats.record_count);
    println!("plaintext bytes:  {}", stats.sum_plain_size);
    println!("packed bytes:     {}", stats.sum_packed_size);
    Ok(())
}
