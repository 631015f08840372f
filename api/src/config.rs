/// Server configuration read from the environment (after `.env` is loaded).
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub download_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Explicit yt-dlp binary; discovered when unset.
    pub ytdlp_path: Option<PathBuf>,
    pub info_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Files older than this are swept; 0 keeps them forever.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            api_host: string_or("API_HOST", "0.0.0.0"),
            api_port: parse_or(&lookup, "API_PORT", 3000),
            download_dir: PathBuf::from(string_or("DOWNLOAD_DIR", "./downloads")),
            public_dir: PathBuf::from(string_or("PUBLIC_DIR", "./public")),
            ytdlp_path: lookup("YT_DLP_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            info_timeout_secs: parse_or(&lookup, "INFO_TIMEOUT_SECS", 120),
            download_timeout_secs: parse_or(&lookup, "DOWNLOAD_TIMEOUT_SECS", 600),
            retention_secs: parse_or(&lookup, "DOWNLOAD_RETENTION_SECS", 0),
            sweep_interval_secs: parse_or(&lookup, "RETENTION_SWEEP_INTERVAL_SECS", 300),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not valid, using default", key, raw);
            default
        }),
    }
}
