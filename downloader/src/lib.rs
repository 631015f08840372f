/// Courier Downloader
///
/// Runs yt-dlp as a subprocess for the API server:
/// - Binary discovery (config, PATH, common install locations)
/// - Version probe, info dump, and download with per-call timeouts
/// - Age-based sweeping of the download directory
pub mod locate;
pub mod retention;
pub mod ytdlp;

pub use locate::locate_ytdlp;
pub use ytdlp::YtDlp;
