use crate::error::ExtractionKind;
use crate::models::RawMetadata;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

static ERROR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^ERROR:\s*").unwrap());

/// A classified extraction failure, surfaced verbatim to the caller.
#[derive(Debug, Clone)]
pub struct ExtractError {
    pub kind: ExtractionKind,
    pub message: String,
}

impl ExtractError {
    pub fn classified(message: String) -> Self {
        ExtractError {
            kind: ExtractionKind::classify(&message),
            message,
        }
    }

    pub fn timeout() -> Self {
        ExtractError {
            kind: ExtractionKind::Timeout,
            message: "Request timed out. The video might be too large or the site is slow."
                .to_string(),
        }
    }
}

/// Site-specific scraping behind one method. The service layer only depends
/// on this capability, so any implementation can swap in.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str, cookies: Option<&Path>) -> Result<RawMetadata, ExtractError>;
}

/// Extraction by shelling out to yt-dlp. One `--dump-json` run per request,
/// killed if it outlives the configured timeout.
pub struct YtDlpExtractor {
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(timeout: Duration) -> Self {
        YtDlpExtractor { timeout }
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(&self, url: &str, cookies: Option<&Path>) -> Result<RawMetadata, ExtractError> {
        let mut cmd = Command::new("yt-dlp");
        cmd.arg("--dump-json")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--skip-download");
        if let Some(path) = cookies {
            cmd.arg("--cookies").arg(path);
        }
        cmd.arg(url).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!("Failed to run yt-dlp: {}", e);
                return Err(ExtractError {
                    kind: ExtractionKind::ServerError,
                    message: "Failed to extract video information".to_string(),
                });
            }
            Err(_) => {
                tracing::warn!("yt-dlp timed out after {:?} for {}", self.timeout, url);
                return Err(ExtractError::timeout());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = ERROR_PREFIX.replace_all(stderr.trim(), "").to_string();
            tracing::error!("yt-dlp failed for {}: {}", url, message);
            let message = if message.is_empty() {
                "Failed to extract video information".to_string()
            } else {
                message
            };
            return Err(ExtractError::classified(message));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            tracing::error!("Failed to parse yt-dlp output for {}: {}", url, e);
            ExtractError {
                kind: ExtractionKind::ServerError,
                message: "Video data format is invalid or unsupported".to_string(),
            }
        })
    }
}
