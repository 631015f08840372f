/// yt-dlp subprocess runner.
///
/// Every call spawns a fresh process with an argv vector (no shell), reads
/// stdout with a size cap, forwards stderr to tracing, and kills the child
/// when its timeout elapses.
use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use courier_shared::errors::ExtractorError;
use courier_shared::formats::ExtractorInfo;
use courier_shared::models::MediaKind;
use courier_shared::naming::{find_output, output_template, DownloadStamp};

/// Default limit for `--dump-json`.
pub const DEFAULT_INFO_TIMEOUT: Duration = Duration::from_secs(120);
/// Default limit for a full download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

const VERSION_TIMEOUT: Duration = Duration::from_secs(15);
const INFO_STDOUT_LIMIT: usize = 10 * 1024 * 1024;
const DOWNLOAD_STDOUT_LIMIT: usize = 100 * 1024 * 1024;
/// Stderr lines kept for error reporting.
const STDERR_KEEP_LINES: usize = 200;

/// Handle to a yt-dlp binary plus the timeouts applied to it.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    info_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            info_timeout: DEFAULT_INFO_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_info_timeout(mut self, timeout: Duration) -> Self {
        self.info_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Path (or bare command name) that is executed.
    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// `yt-dlp --version`
    pub async fn version(&self) -> Result<String, ExtractorError> {
        let out = self.run(&[OsString::from("--version")], VERSION_TIMEOUT, 4096).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// Dump the info dictionary of a single video.
    pub async fn fetch_info(&self, url: &str) -> Result<ExtractorInfo, ExtractorError> {
        info!("Getting info: {}", url);
        let out = self.run(&info_args(url), self.info_timeout, INFO_STDOUT_LIMIT).await?;
        ExtractorInfo::from_json(&out)
    }

    /// Download `url` into `dir` and return the path of the produced file.
    ///
    /// Audio downloads always take the best audio stream and convert it to mp3;
    /// `format_id` only applies to video.
    pub async fn download(
        &self,
        url: &str,
        format_id: &str,
        kind: MediaKind,
        dir: &Path,
    ) -> Result<PathBuf, ExtractorError> {
        let stamp = DownloadStamp::next();
        let template = output_template(dir, stamp, kind);
        let args = download_args(url, format_id, kind, &template);

        let out = self.run(&args, self.download_timeout, DOWNLOAD_STDOUT_LIMIT).await?;
        debug!("Download output: {}", String::from_utf8_lossy(&out).trim());

        let file = find_output(dir, stamp)?.ok_or(ExtractorError::OutputMissing)?;
        info!("Downloaded file: {}", file.display());
        Ok(file)
    }

    /// Spawn yt-dlp, wait for it within `timeout`, and return its stdout.
    async fn run(
        &self,
        args: &[OsString],
        timeout: Duration,
        stdout_limit: usize,
    ) -> Result<Vec<u8>, ExtractorError> {
        info!("Executing: {}", render_command(&self.bin, args));

        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ExtractorError::NotFound(self.bin.display().to_string())
                }
                _ => ExtractorError::SpawnFailed(format!("{}: {}", self.bin.display(), e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::SpawnFailed("No stdout handle".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::SpawnFailed("No stderr handle".into()))?;

        // Stderr reader task - forward to tracing, keep the tail for errors.
        // Lines are decoded lossily and the pipe is drained until EOF, so a
        // stray non-UTF-8 byte never closes it under a running child.
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut kept = VecDeque::with_capacity(STDERR_KEEP_LINES);
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Reading yt-dlp stderr failed: {}", e);
                        break;
                    }
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                debug!(target: "yt_dlp", "{}", line);
                if kept.len() == STDERR_KEEP_LINES {
                    kept.pop_front();
                }
                kept.push_back(line);
            }
            kept.into_iter().collect::<Vec<_>>().join("\n")
        });

        let outcome = tokio::time::timeout(timeout, async {
            let mut out = Vec::new();
            stdout
                .take(stdout_limit as u64 + 1)
                .read_to_end(&mut out)
                .await?;
            if out.len() > stdout_limit {
                return Ok(None);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(Some((status, out)))
        })
        .await;

        match outcome {
            Err(_) => {
                warn!("yt-dlp timed out after {}s, killing", timeout.as_secs());
                let _ = child.kill().await;
                stderr_task.abort();
                Err(ExtractorError::Timeout(timeout.as_secs()))
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                stderr_task.abort();
                Err(ExtractorError::Io(e))
            }
            Ok(Ok(None)) => {
                warn!("yt-dlp stdout exceeded {} bytes, killing", stdout_limit);
                let _ = child.kill().await;
                stderr_task.abort();
                Err(ExtractorError::OutputTooLarge(stdout_limit))
            }
            Ok(Ok(Some((status, out)))) => {
                let stderr_text = stderr_task.await.unwrap_or_default();
                if status.success() {
                    Ok(out)
                } else {
                    warn!("yt-dlp failed ({}): {}", status, stderr_text);
                    Err(ExtractorError::from_exit(status.code(), stderr_text.as_bytes()))
                }
            }
        }
    }
}

/// Arguments for dumping a single video's metadata.
pub fn info_args(url: &str) -> Vec<OsString> {
    ["--dump-json", "--no-warnings", "--no-playlist", "--", url]
        .iter()
        .map(OsString::from)
        .collect()
}

/// Arguments for downloading into `template`.
pub fn download_args(url: &str, format_id: &str, kind: MediaKind, template: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = match kind {
        MediaKind::Audio => [
            "-f",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            "mp3",
            "--audio-quality",
            "0",
            "--no-check-certificates",
            "--prefer-ffmpeg",
        ]
        .iter()
        .map(OsString::from)
        .collect(),
        MediaKind::Video => [
            "-f",
            format_id,
            "--remux-video",
            "mp4",
            "--merge-output-format",
            "mp4",
        ]
        .iter()
        .map(OsString::from)
        .collect(),
    };
    args.push("--no-playlist".into());
    args.push("-o".into());
    args.push(template.as_os_str().to_os_string());
    args.push("--".into());
    args.push(url.into());
    args
}

fn render_command(bin: &Path, args: &[OsString]) -> String {
    std::iter::once(bin.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
