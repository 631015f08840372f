/// Unified error types for Courier.
use thiserror::Error;

/// Errors in a client request, rejected before yt-dlp is run.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported platform. Use YouTube, TikTok, or Instagram.")]
    UnsupportedPlatform,
}

/// Errors raised while running the yt-dlp subprocess.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("yt-dlp not found at {0}")]
    NotFound(String),

    #[error("Failed to spawn yt-dlp: {0}")]
    SpawnFailed(String),

    #[error("{stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("yt-dlp timed out after {0}s")]
    Timeout(u64),

    #[error("yt-dlp output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("yt-dlp returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Download completed but file not found")]
    OutputMissing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractorError {
    /// Build a `Failed` error from a finished process, keeping only the tail of stderr.
    pub fn from_exit(code: Option<i32>, stderr: &[u8]) -> Self {
        let text = String::from_utf8_lossy(stderr);
        let text = text.trim();
        let stderr = if text.is_empty() {
            match code {
                Some(c) => format!("yt-dlp exited with code {}", c),
                None => "yt-dlp was terminated by a signal".to_string(),
            }
        } else {
            tail_chars(text, STDERR_TAIL_CHARS)
        };
        ExtractorError::Failed { code, stderr }
    }

    /// Whether the failure came from malformed extractor output rather than the process.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, ExtractorError::InvalidJson(_))
    }
}

/// How much of stderr is carried into an error message.
pub const STDERR_TAIL_CHARS: usize = 2000;

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}

/// Result type alias for Courier operations.
pub type CourierResult<T> = Result<T, CourierError>;
