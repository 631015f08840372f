/// Parsing of `yt-dlp --dump-json` output and the format menu built from it.
use serde::Deserialize;
use serde_json::Number;

use crate::errors::ExtractorError;
use crate::models::{FormatOption, MediaKind, Platform, VideoInfo};

/// How many distinct resolutions are offered besides "best".
pub const MAX_RESOLUTIONS: usize = 5;

/// Format selector for the best available video merged with the best audio.
pub const BEST_VIDEO_SELECTOR: &str = "bv*+ba/b";
/// Format selector for the best audio-only stream.
pub const AUDIO_SELECTOR: &str = "ba";

/// The subset of the extractor's info dictionary that Courier reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractorInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<Number>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub formats: Option<Vec<ExtractorFormat>>,
}

/// One entry of the extractor's `formats` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractorFormat {
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
}

impl ExtractorFormat {
    /// Height of the video track, if this format carries one.
    fn video_height(&self) -> Option<u32> {
        let height = self.height.filter(|h| *h > 0)?;
        if self.vcodec.as_deref() == Some("none") {
            return None;
        }
        Some(height)
    }
}

impl ExtractorInfo {
    /// Parse the JSON document printed by `--dump-json`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ExtractorError> {
        serde_json::from_slice(bytes).map_err(|e| ExtractorError::InvalidJson(e.to_string()))
    }
}

/// Build the menu offered to the user: best, up to five heights, then audio.
pub fn build_format_menu(info: &ExtractorInfo) -> Vec<FormatOption> {
    let mut menu = vec![FormatOption {
        format_id: BEST_VIDEO_SELECTOR.to_string(),
        quality: "Best Quality (MP4)".to_string(),
        ext: "mp4".to_string(),
        kind: MediaKind::Video,
    }];

    let mut heights: Vec<u32> = info
        .formats
        .iter()
        .flatten()
        .filter_map(ExtractorFormat::video_height)
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();

    for height in heights.into_iter().take(MAX_RESOLUTIONS) {
        menu.push(FormatOption {
            format_id: format!("bv*[height<={h}]+ba/b[height<={h}]", h = height),
            quality: format!("{}p (MP4)", height),
            ext: "mp4".to_string(),
            kind: MediaKind::Video,
        });
    }

    menu.push(FormatOption {
        format_id: AUDIO_SELECTOR.to_string(),
        quality: "Audio Only (MP3)".to_string(),
        ext: "mp3".to_string(),
        kind: MediaKind::Audio,
    });

    menu
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Shape extractor output into the API response.
pub fn to_video_info(info: &ExtractorInfo, platform: Platform, url: &str) -> VideoInfo {
    VideoInfo {
        title: non_empty(&info.title).unwrap_or("Unknown Title").to_string(),
        thumbnail: non_empty(&info.thumbnail).unwrap_or_default().to_string(),
        duration: info
            .duration
            .clone()
            .filter(|d| d.as_f64().is_some_and(|v| v > 0.0))
            .unwrap_or_else(|| Number::from(0)),
        uploader: non_empty(&info.uploader)
            .or_else(|| non_empty(&info.channel))
            .unwrap_or("Unknown")
            .to_string(),
        platform,
        formats: build_format_menu(info),
        original_url: url.to_string(),
    }
}
