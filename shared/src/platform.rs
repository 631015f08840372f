/// Platform detection and URL validation for incoming requests.
///
/// Only the host is inspected; yt-dlp decides whether the path is a real video.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{CourierError, CourierResult};
use crate::models::Platform;

/// Optional http(s) scheme, any number of subdomains, then a known host
/// followed by a port, path, query, fragment, or end of input.
static HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:https?://)?(?:[a-z0-9-]+\.)*(youtube\.com|youtu\.be|tiktok\.com|instagram\.com)(?::\d+)?(?:[/?#]|$)"
    ).unwrap()
});

/// Detect which supported platform a URL points at.
pub fn detect_platform(url: &str) -> Option<Platform> {
    let cap = HOST_RE.captures(url.trim())?;
    match cap[1].to_ascii_lowercase().as_str() {
        "youtube.com" | "youtu.be" => Some(Platform::Youtube),
        "tiktok.com" => Some(Platform::Tiktok),
        "instagram.com" => Some(Platform::Instagram),
        _ => None,
    }
}

/// Trim and check a user-supplied URL, returning it with its platform.
pub fn validate_url(raw: Option<&str>) -> CourierResult<(String, Platform)> {
    let url = raw.map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(CourierError::InvalidRequest("URL is required".to_string()));
    }
    if url.starts_with('-') || url.chars().any(char::is_whitespace) {
        return Err(CourierError::InvalidRequest("Invalid URL".to_string()));
    }
    let platform = detect_platform(url).ok_or(CourierError::UnsupportedPlatform)?;
    Ok((url.to_string(), platform))
}
