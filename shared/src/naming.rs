/// Output file naming: per-request stamps, yt-dlp templates, and safe lookups.
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::models::MediaKind;

/// Longest sanitized filename handed back to clients.
pub const MAX_FILENAME_CHARS: usize = 200;

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp that tags every file produced by one download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DownloadStamp(i64);

impl DownloadStamp {
    /// Current time in ms, bumped past the previous stamp if the clock has not moved.
    pub fn next() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut prev = LAST_STAMP.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match LAST_STAMP.compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::Relaxed) {
                Ok(_) => return DownloadStamp(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn from_millis(ms: i64) -> Self {
        DownloadStamp(ms)
    }

    /// Marker embedded in the output filename.
    pub fn marker(&self) -> String {
        format!("_{}", self.0)
    }
}

impl std::fmt::Display for DownloadStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// yt-dlp `-o` template: the title capped at 100 chars, then the stamp.
pub fn output_template(dir: &Path, stamp: DownloadStamp, kind: MediaKind) -> PathBuf {
    dir.join(format!("%(title).100s{}.{}", stamp.marker(), kind.extension()))
}

/// Strip characters that are invalid in filenames and normalise whitespace.
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_FILENAME_CHARS).collect()
}

/// Accept only a bare filename that cannot escape its directory.
///
/// The name must be a single normal path component, so drive prefixes such
/// as `C:name` (which make `Path::join` discard the base) are rejected too.
pub fn validate_served_name(name: &str) -> Option<&str> {
    if name.contains(['/', '\\', '\0']) {
        return None;
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(name),
        _ => None,
    }
}

/// Find the file a download produced, by its stamp marker.
///
/// Leftover intermediates (`title_<stamp>.f137.mp4`) sort after the final file.
pub fn find_output(dir: &Path, stamp: DownloadStamp) -> std::io::Result<Option<PathBuf>> {
    let marker = format!("{}.", stamp.marker());
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().contains(&marker) {
            matches.push(entry.path());
        }
    }
    matches.sort_by_key(|p| (p.as_os_str().len(), p.clone()));
    Ok(matches.into_iter().next())
}
