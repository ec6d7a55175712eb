use serde::{Deserialize, Serialize};

// === API Request Models ===

/// The JSON body for a `POST /api/info` request.
#[derive(Deserialize, Debug)]
pub struct InfoRequest {
    pub url: String,
}

/// The query parameters for a `GET /api/download` request.
#[derive(Deserialize, Debug)]
pub struct DownloadParams {
    pub url: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_ext")]
    pub ext: String,
}

fn default_filename() -> String {
    "video".to_string()
}

fn default_ext() -> String {
    "mp4".to_string()
}

/// The JSON body for a `POST /api/cookies` request.
#[derive(Deserialize, Debug)]
pub struct CookieRequest {
    pub content: String,
}

// === Extractor Output Models ===

/// A single format entry as reported by the extractor, before normalization.
///
/// Follows the yt-dlp JSON conventions: most fields are optional, and a codec
/// may be reported as the literal string "none" instead of being absent.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s.
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Audio bitrate in kbit/s.
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<i64>,
    #[serde(default)]
    pub filesize_approx: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: Option<String>,
}

/// Raw per-video metadata returned by an extractor.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RawMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub uploader_url: Option<String>,
    #[serde(default)]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub extractor: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

// === API Response Models ===

/// A format after classification, labeling, deduplication and ranking.
///
/// Created once per extraction response and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NormalizedFormat {
    pub format_id: String,
    /// Human-readable label like "1080p · mp4", never empty.
    pub label: String,
    /// Quality rank token like "1080p", "4K", "High".
    pub quality: String,
    pub extension: String,
    /// Known or approximate size in bytes; `None` when missing or non-positive.
    pub filesize: Option<u64>,
    pub is_audio: bool,
    pub is_video_only: bool,
    pub has_video: bool,
    pub has_audio: bool,
    /// Set on the top-ranked merged (video+audio) format, if any.
    pub is_best: bool,
    pub height: Option<i64>,
    pub width: Option<i64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub tbr: Option<f64>,
    pub abr: Option<f64>,
    pub url: String,
}

/// The success body for `POST /api/info`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InfoResponse {
    pub success: bool,
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<u64>,
    /// Human-readable duration like "5:32" or "1:02:03".
    pub duration_string: String,
    pub uploader: String,
    pub uploader_url: Option<String>,
    pub webpage_url: String,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    /// Truncated description, omitted when the extractor reports none.
    pub description: Option<String>,
    pub extractor: String,
    pub formats: Vec<NormalizedFormat>,
}
