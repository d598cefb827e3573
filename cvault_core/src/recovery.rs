//! Catalog recovery (C7): rebuilds a local catalog from encrypted snapshots
//! when the local catalog is empty but the device is known to the server.

use tracing::warn;

use crate::catalog::CatalogStore;
use crate::crypto::{self, VaultKey};
use crate::error::CoreResult;
use crate::restore::Downloader;

/// Downloads every listed catalog snapshot for the device, decrypts each,
/// and merges it into `catalog`. Snapshots that fail to decrypt (wrong
/// passphrase, corruption) are skipped, not fatal — recovery is a
/// belt-and-braces merge of whatever successfully opens.
///
/// Returns the number of snapshots successfully merged.
pub async fn recover(
    catalog: &dyn CatalogStore,
    downloader: &dyn Downloader,
    key: &VaultKey,
    tmp_dir: &std::path::Path,
) -> CoreResult<usize> {
    let urls = downloader.list_catalog_snapshots().await?;
    let mut merged = 0usize;

    for url in urls {
        let sealed = match downloader.download_url(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "failed to download catalog snapshot, skipping");
                continue;
            }
        };

        let plaintext = match crypto::open(&sealed, key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "snapshot failed integrity check, skipping");
                continue;
            }
        };

        let tmp_path = tmp_dir.join(format!("recovery-{merged}.snapshot"));
        if let Err(e) = std::fs::write(&tmp_path, &plaintext) {
            warn!(url = %url, error = %e, "failed writing snapshot to temp file, skipping");
            continue;
        }

        if let Err(e) = catalog.import_snapshot(&tmp_path).await {
            warn!(url = %url, error = %e, "failed merging snapshot into catalog, skipping");
            let _ = std::fs::remove_file(&tmp_path);
            continue;
        }
        let _ = std::fs::remove_file(&tmp_path);

        merged += 1;
    }

    Ok(merged)
}
