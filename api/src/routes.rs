/// API route handlers for Courier.
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use courier_shared::errors::{CourierError, ExtractorError};
use courier_shared::formats;
use courier_shared::models::{
    DownloadRequest, DownloadResponse, ErrorBody, HealthResponse, InfoRequest, VideoInfo,
};
use courier_shared::naming::{sanitize_filename, validate_served_name};
use courier_shared::platform::validate_url;

use crate::AppState;

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody::new(message)))
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    reject(
        StatusCode::BAD_REQUEST,
        format!("Invalid request body: {}", rejection.body_text()),
    )
}

fn request_error(e: CourierError) -> ApiError {
    let status = match e {
        CourierError::InvalidRequest(_) | CourierError::UnsupportedPlatform => StatusCode::BAD_REQUEST,
    };
    reject(status, e.to_string())
}

// ====== INFO ======

/// POST /api/info
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<VideoInfo>, ApiError> {
    let Json(body) = payload.map_err(bad_body)?;
    let (url, platform) = validate_url(body.url.as_deref()).map_err(request_error)?;

    let info = state.ytdlp.fetch_info(&url).await.map_err(|e| {
        if e.is_parse_error() {
            error!("Parse error: {}", e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Failed to parse video info")
        } else {
            error!("Error: {}", e);
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to fetch video info. {}", e),
            )
        }
    })?;

    Ok(Json(formats::to_video_info(&info, platform, &url)))
}

// ====== DOWNLOAD ======

/// POST /api/download
pub async fn download(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(body) = payload.map_err(bad_body)?;

    let url_given = body.url.as_deref().is_some_and(|u| !u.trim().is_empty());
    let format_id = body.format_id.as_deref().map(str::trim).filter(|f| !f.is_empty());
    let Some(format_id) = format_id.filter(|_| url_given) else {
        return Err(reject(StatusCode::BAD_REQUEST, "URL and format are required"));
    };
    let (url, platform) = validate_url(body.url.as_deref()).map_err(request_error)?;

    info!("Download requested: platform={} kind={} format={} url={}", platform, body.kind, format_id, url);

    let path = state
        .ytdlp
        .download(&url, format_id, body.kind, &state.download_dir)
        .await
        .map_err(|e| {
            error!("Download error: {}", e);
            if matches!(e, ExtractorError::OutputMissing) {
                reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            } else {
                reject(StatusCode::INTERNAL_SERVER_ERROR, format!("Download failed: {}", e))
            }
        })?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                ExtractorError::OutputMissing.to_string(),
            )
        })?
        .to_string();

    Ok(Json(DownloadResponse {
        success: true,
        download_url: format!("/downloads/{}", urlencoding::encode(&filename)),
        filename,
    }))
}

// ====== FILES ======

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".mkv") {
        "video/x-matroska"
    } else if lower.ends_with(".mp3") {
        "audio/mpeg"
    } else if lower.ends_with(".m4a") || lower.ends_with(".aac") {
        "audio/mp4"
    } else if lower.ends_with(".opus") || lower.ends_with(".ogg") {
        "audio/ogg"
    } else {
        "application/octet-stream"
    }
}

/// `attachment` disposition with an ASCII fallback name plus the full UTF-8 name.
fn attachment_disposition(filename: &str) -> String {
    let clean = sanitize_filename(filename);
    let ascii: String = clean
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(&clean)
    )
}

/// GET /api/file/:filename - Serve a finished download as an attachment
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_served_name(&filename)
        .ok_or_else(|| reject(StatusCode::BAD_REQUEST, "Invalid filename"))?;
    let path = state.download_dir.join(name);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(reject(StatusCode::NOT_FOUND, "File not found")),
    };

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!("Cannot open {}: {}", path.display(), e);
        reject(StatusCode::INTERNAL_SERVER_ERROR, format!("Cannot open file: {}", e))
    })?;

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(name).to_string()),
            (header::CONTENT_LENGTH, meta.len().to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(name)),
        ],
        body,
    ))
}

// ====== HEALTH ======

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    match state.ytdlp.version().await {
        Ok(version) => Json(HealthResponse::Ok {
            ytdlp: version,
            path: state.ytdlp.bin().display().to_string(),
        }),
        Err(e) => {
            warn!("yt-dlp health check failed: {}", e);
            Json(HealthResponse::Error {
                message: "yt-dlp not found".to_string(),
                ytdlp: None,
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use axum::http::Request;
    use axum::Router;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use courier_downloader::YtDlp;

    const INFO_JSON: &str = r#"{"title":"Never Gonna Give You Up","thumbnail":"https://i.ytimg.com/vi/x/hq.jpg","duration":212,"uploader":"Rick Astley","formats":[{"height":360,"vcodec":"avc1"},{"height":1080,"vcodec":"avc1"},{"vcodec":"none"}]}"#;

    const DOWNLOAD_SCRIPT: &str = r#"
tpl=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then tpl="$arg"; fi
  prev="$arg"
done
out=$(printf '%s' "$tpl" | sed 's/%(title)\.100s/Clip Title/')
printf 'media-bytes' > "$out"
"#;

    struct TestApp {
        router: Router,
        downloads: TempDir,
        _bin_dir: TempDir,
        _public: TempDir,
    }

    /// Router backed by a shell script standing in for yt-dlp.
    fn test_app(script: &str) -> TestApp {
        let bin_dir = tempfile::tempdir().unwrap();
        let bin = bin_dir.path().join("yt-dlp");
        std::fs::write(&bin, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        app_with_bin(bin, bin_dir)
    }

    fn app_with_bin(bin: PathBuf, bin_dir: TempDir) -> TestApp {
        let downloads = tempfile::tempdir().unwrap();
        let public = tempfile::tempdir().unwrap();
        std::fs::write(public.path().join("index.html"), "<title>Courier</title>").unwrap();

        let state = Arc::new(AppState {
            ytdlp: YtDlp::new(bin),
            download_dir: downloads.path().to_path_buf(),
        });
        TestApp {
            router: crate::build_router(state, public.path()),
            downloads,
            _bin_dir: bin_dir,
            _public: public,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, bytes) = send(router, req).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(router, req).await
    }

    #[tokio::test]
    async fn test_info_requires_url() {
        let app = test_app("exit 1");
        let (status, body) = post_json(&app.router, "/api/info", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL is required");
    }

    #[tokio::test]
    async fn test_info_rejects_unsupported_platform() {
        let app = test_app("exit 1");
        let (status, body) =
            post_json(&app.router, "/api/info", r#"{"url":"https://vimeo.com/1"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported platform. Use YouTube, TikTok, or Instagram.");
    }

    #[tokio::test]
    async fn test_info_malformed_body() {
        let app = test_app("exit 1");
        let (status, body) = post_json(&app.router, "/api/info", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_info_success() {
        let app = test_app(&format!("echo '{}'", INFO_JSON));
        let (status, body) = post_json(
            &app.router,
            "/api/info",
            r#"{"url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Never Gonna Give You Up");
        assert_eq!(body["uploader"], "Rick Astley");
        assert!(body["duration"].is_u64(), "{}", body["duration"]);
        assert_eq!(body["duration"], 212);
        assert_eq!(body["platform"], "youtube");
        assert_eq!(body["original_url"], "https://www.youtube.com/watch?v=dQw4w9WgXcQ");

        let formats = body["formats"].as_array().unwrap();
        let labels: Vec<&str> = formats.iter().map(|f| f["quality"].as_str().unwrap()).collect();
        assert_eq!(labels, vec!["Best Quality (MP4)", "1080p (MP4)", "360p (MP4)", "Audio Only (MP3)"]);
        assert_eq!(formats[3]["type"], "audio");
    }

    #[tokio::test]
    async fn test_info_extractor_failure() {
        let app = test_app("echo 'ERROR: [youtube] x: Video unavailable' >&2\nexit 1");
        let (status, body) =
            post_json(&app.router, "/api/info", r#"{"url":"https://youtu.be/dQw4w9WgXcQ"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Failed to fetch video info. ERROR: [youtube] x: Video unavailable"
        );
    }

    #[tokio::test]
    async fn test_info_unparsable_output() {
        let app = test_app("echo 'garbage'");
        let (status, body) =
            post_json(&app.router, "/api/info", r#"{"url":"https://youtu.be/dQw4w9WgXcQ"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to parse video info");
    }

    #[tokio::test]
    async fn test_download_requires_url_and_format() {
        let app = test_app(DOWNLOAD_SCRIPT);
        let (status, body) =
            post_json(&app.router, "/api/download", r#"{"url":"https://youtu.be/x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL and format are required");

        let (status, _) = post_json(&app.router, "/api/download", r#"{"format_id":"ba"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_rejects_unsupported_platform() {
        let app = test_app(DOWNLOAD_SCRIPT);
        let (status, body) = post_json(
            &app.router,
            "/api/download",
            r#"{"url":"https://vimeo.com/76979871","format_id":"bv*+ba/b"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported platform. Use YouTube, TikTok, or Instagram.");
        assert_eq!(std::fs::read_dir(app.downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_rejects_unknown_type() {
        let app = test_app(DOWNLOAD_SCRIPT);
        let (status, body) = post_json(
            &app.router,
            "/api/download",
            r#"{"url":"https://youtu.be/x","format_id":"ba","type":"gif"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"), "{}", body);
        assert_eq!(std::fs::read_dir(app.downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_then_fetch_file() {
        let app = test_app(DOWNLOAD_SCRIPT);
        let (status, body) = post_json(
            &app.router,
            "/api/download",
            r#"{"url":"https://www.instagram.com/reel/Cabc/","format_id":"ba","type":"audio"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let filename = body["filename"].as_str().unwrap().to_string();
        assert!(filename.starts_with("Clip Title_"), "{}", filename);
        assert!(filename.ends_with(".mp3"), "{}", filename);
        assert!(app.downloads.path().join(&filename).is_file());

        let download_url = body["downloadUrl"].as_str().unwrap();
        assert!(download_url.starts_with("/downloads/Clip%20Title_"), "{}", download_url);

        let (status, headers, bytes) =
            get(&app.router, &format!("/api/file/{}", urlencoding::encode(&filename))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"media-bytes");
        assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"Clip Title_"), "{}", disposition);

        let (status, _, bytes) = get(&app.router, download_url).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"media-bytes");
    }

    #[tokio::test]
    async fn test_download_failure() {
        let app = test_app("echo 'ERROR: Requested format is not available' >&2\nexit 1");
        let (status, body) = post_json(
            &app.router,
            "/api/download",
            r#"{"url":"https://youtu.be/x","format_id":"bv*[height<=4320]+ba/b[height<=4320]"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Download failed: ERROR: Requested format is not available");
    }

    #[tokio::test]
    async fn test_download_with_missing_output() {
        let app = test_app("echo finished");
        let (status, body) = post_json(
            &app.router,
            "/api/download",
            r#"{"url":"https://youtu.be/x","format_id":"bv*+ba/b","type":"video"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Download completed but file not found");
    }

    #[tokio::test]
    async fn test_file_not_found_and_traversal() {
        let app = test_app("exit 0");
        let (status, _, bytes) = get(&app.router, "/api/file/nothing_1.mp4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "File not found");

        let (status, _, _) = get(&app.router, "/api/file/..%2Fsecret.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_ok() {
        let app = test_app("echo 2024.08.06");
        let (status, _, bytes) = get(&app.router, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ytdlp"], "2024.08.06");
        assert!(body["path"].as_str().unwrap().ends_with("yt-dlp"));
    }

    #[tokio::test]
    async fn test_health_missing_binary() {
        let bin_dir = tempfile::tempdir().unwrap();
        let app = app_with_bin(bin_dir.path().join("absent-yt-dlp"), bin_dir);
        let (status, _, bytes) = get(&app.router, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "yt-dlp not found");
        assert!(body["ytdlp"].is_null());
    }

    #[tokio::test]
    async fn test_index_and_cors() {
        let app = test_app("exit 0");
        let req = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let (status, headers, bytes) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"<title>Courier</title>");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.MP4"), "video/mp4");
        assert_eq!(content_type_for("a.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }

    #[test]
    fn test_attachment_disposition_non_ascii() {
        let value = attachment_disposition("Café \"live\"_1.mp4");
        assert!(value.starts_with("attachment; filename=\"Caf_ live_1.mp4\""), "{}", value);
        assert!(value.contains("filename*=UTF-8''Caf%C3%A9%20live_1.mp4"), "{}", value);
    }
}
