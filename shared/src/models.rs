/// Request and response models shared by the Courier API and downloader.
use serde::{Deserialize, Serialize};

/// Video platform a URL belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a format yields a video file or an audio-only file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Container extension of the final file.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ====== REQUESTS ======

/// Body of `POST /api/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of `POST /api/download`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: MediaKind,
}

// ====== RESPONSES ======

/// A single entry of the format menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatOption {
    pub format_id: String,
    pub quality: String,
    pub ext: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

/// Metadata returned by `POST /api/info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: String,
    pub thumbnail: String,
    /// Seconds, echoed exactly as yt-dlp reported them (`212` or `12.5`).
    pub duration: serde_json::Number,
    pub uploader: String,
    pub platform: Platform,
    pub formats: Vec<FormatOption>,
    pub original_url: String,
}

/// Result of a completed download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadResponse {
    pub success: bool,
    pub filename: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthResponse {
    Ok {
        ytdlp: String,
        path: String,
    },
    Error {
        message: String,
        ytdlp: Option<String>,
    },
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
