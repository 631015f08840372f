/// yt-dlp binary discovery.
///
/// Checks the configured path first, then `PATH`, then the places the
/// usual installers drop the binary.
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Command name used when nothing better is found.
pub const DEFAULT_BIN: &str = "yt-dlp";

/// Well-known install locations, checked after `PATH`.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if cfg!(target_os = "windows") {
        if let Ok(local_app) = std::env::var("LOCALAPPDATA") {
            // winget package directory
            paths.push(
                PathBuf::from(&local_app)
                    .join("Microsoft")
                    .join("WinGet")
                    .join("Packages")
                    .join("yt-dlp.yt-dlp_Microsoft.Winget.Source_8wekyb3d8bbwe")
                    .join("yt-dlp.exe"),
            );
        }
        if let Ok(profile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(&profile).join("yt-dlp.exe"));
            paths.push(PathBuf::from(&profile).join("Downloads").join("yt-dlp.exe"));
        }
        paths.push(PathBuf::from(r"C:\yt-dlp\yt-dlp.exe"));
    } else {
        for dir in ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/snap/bin"] {
            paths.push(Path::new(dir).join(DEFAULT_BIN));
        }
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".local").join("bin").join(DEFAULT_BIN));
        }
    }

    paths
}

/// Resolve the yt-dlp binary to invoke.
///
/// Never fails: when nothing is found the bare command name is returned and
/// the health endpoint reports whether it actually runs.
pub fn locate_ytdlp(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        if path.is_file() {
            info!("Using configured yt-dlp at: {}", path.display());
            return path.to_path_buf();
        }
        warn!("Configured yt-dlp path {} does not exist, searching", path.display());
    }

    if let Ok(found) = which::which(DEFAULT_BIN) {
        info!("Found yt-dlp on PATH at: {}", found.display());
        return found;
    }

    if let Some(found) = candidate_paths().into_iter().find(|p| p.is_file()) {
        info!("Found yt-dlp at: {}", found.display());
        return found;
    }

    warn!("yt-dlp not found, using default command");
    PathBuf::from(DEFAULT_BIN)
}
