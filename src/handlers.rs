use crate::{
    error::AppError,
    formats,
    models::{CookieRequest, DownloadParams, InfoRequest, InfoResponse, NormalizedFormat, RawMetadata},
    proxy, AppState,
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use anyhow::anyhow;
use serde_json::json;
use std::path::PathBuf;

const MAX_INFO_URL_LEN: usize = 2048;
const MAX_DOWNLOAD_URL_LEN: usize = 4096;
const MAX_DESCRIPTION_CHARS: usize = 300;

// ===================================================================
//                          INFO HANDLER
// ===================================================================

/// # POST /api/info - Extracts metadata and a ranked format list for a URL.
pub async fn video_info(
    State(state): State<AppState>,
    Json(payload): Json<InfoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let url = payload.url.trim().to_string();
    if url.len() < 5 || url.len() > MAX_INFO_URL_LEN {
        return Err(AppError::BadRequest(
            "URL must be between 5 and 2048 characters".to_string(),
        ));
    }
    let lowered = url.to_ascii_lowercase();
    if !lowered.starts_with("http://") && !lowered.starts_with("https://") {
        return Err(AppError::InvalidUrl(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    if url.chars().any(char::is_control) {
        return Err(AppError::InvalidUrl("URL contains invalid characters".to_string()));
    }

    tracing::info!("Fetching info for URL: {}", url);

    let cookies_path = {
        let config = state.config.read().unwrap();
        PathBuf::from(&config.cookies_path)
    };
    let cookies = cookies_path.exists().then_some(cookies_path.as_path());

    let raw = state
        .extractor
        .extract(&url, cookies)
        .await
        .map_err(|e| AppError::Extraction {
            kind: e.kind,
            message: e.message,
        })?;

    let formats = formats::normalize(&raw.formats);
    tracing::info!(
        "Extracted {} formats for '{}'",
        formats.len(),
        raw.title.as_deref().unwrap_or("Untitled")
    );

    Ok((StatusCode::OK, Json(build_info_response(&url, raw, formats))))
}

fn build_info_response(
    request_url: &str,
    raw: RawMetadata,
    formats: Vec<NormalizedFormat>,
) -> InfoResponse {
    let duration = raw.duration.filter(|d| *d >= 0.0).map(|d| d as u64);
    let thumbnail = raw
        .thumbnail
        .or_else(|| raw.thumbnails.iter().rev().find_map(|t| t.url.clone()));
    let description = raw
        .description
        .filter(|d| !d.is_empty())
        .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS));

    InfoResponse {
        success: true,
        title: raw.title.unwrap_or_else(|| "Untitled".to_string()),
        thumbnail,
        duration,
        duration_string: format_duration(duration),
        uploader: raw.uploader.or(raw.channel).unwrap_or_default(),
        uploader_url: raw.uploader_url.or(raw.channel_url),
        webpage_url: raw.webpage_url.unwrap_or_else(|| request_url.to_string()),
        view_count: raw.view_count,
        upload_date: raw.upload_date,
        description,
        extractor: raw.extractor.unwrap_or_default(),
        formats,
    }
}

fn format_duration(seconds: Option<u64>) -> String {
    let Some(total) = seconds else {
        return String::new();
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max).collect();
        format!("{truncated}...")
    }
}

// ===================================================================
//                          DOWNLOAD HANDLER
// ===================================================================

/// # GET /api/download - Proxies a format URL as a resumable byte stream.
pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if params.url.len() < 5 || params.url.len() > MAX_DOWNLOAD_URL_LEN {
        return Err(AppError::InvalidUrl("Invalid download URL.".to_string()));
    }
    // The extension comes from the format list the client was served, so
    // anything fancier than a short alphanumeric token is off-script.
    if params.ext.is_empty()
        || params.ext.len() > 10
        || !params.ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::BadRequest("Invalid file extension".to_string()));
    }

    tracing::info!("Proxying download of {}.{}", params.filename, params.ext);

    let range = headers.get(header::RANGE);
    proxy::stream(&state.http, &params.url, range, &params.filename, &params.ext).await
}

// ===================================================================
//                          COOKIES & HEALTH
// ===================================================================

/// # POST /api/cookies - Replaces the cookies file used by the extractor.
pub async fn update_cookies(
    State(state): State<AppState>,
    Json(payload): Json<CookieRequest>,
) -> Result<impl IntoResponse, AppError> {
    let path = {
        let config = state.config.read().unwrap();
        PathBuf::from(&config.cookies_path)
    };
    if path.as_os_str().is_empty() {
        return Err(AppError::Internal(anyhow!("cookies_path is not configured")));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&path, payload.content).await?;

    tracing::info!("Cookies updated via API");
    Ok((
        StatusCode::OK,
        Json(json!({"success": true, "message": "Cookies updated successfully"})),
    ))
}

/// # GET /health - Liveness probe; bypasses rate limiting.
pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "anyvid-api"}))
}
