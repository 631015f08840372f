/// Age-based cleanup of the download directory.
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Delete regular files in `dir` last modified more than `max_age` ago.
///
/// Returns how many files were removed. Files that vanish or cannot be
/// deleted mid-sweep are logged and skipped.
pub async fn sweep_expired(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to delete expired file {}: {}", entry.path().display(), e),
        }
    }

    Ok(removed)
}
