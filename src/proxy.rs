//! Relays bytes from a direct media URL to the client with Range semantics.
//!
//! The body is streamed chunk by chunk straight from the upstream socket to
//! the client socket; nothing is buffered in full, since media files can be
//! gigabytes. Backpressure and cancellation come from the body stream
//! itself: axum stops polling when the client stalls and drops the stream on
//! disconnect, which closes the upstream connection.

use crate::error::AppError;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use tokio_stream::StreamExt;
use url::Url;

static UNSAFE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f\x7f]"#).unwrap());

const MAX_FILENAME_CHARS: usize = 200;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Strips path separators, control characters and anything else unsafe in a
/// Content-Disposition value, and bounds the length. Never empty.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME.replace_all(name, "_");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    let bounded: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    if bounded.is_empty() {
        "download".to_string()
    } else {
        bounded
    }
}

/// Only http/https upstreams are permitted; anything else (file:, ftp:,
/// custom schemes from a hostile extractor) is rejected before any network
/// call is made.
pub fn validate_upstream_url(raw: &str) -> Result<Url, AppError> {
    let parsed =
        Url::parse(raw).map_err(|_| AppError::InvalidUrl("Invalid download URL.".to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(AppError::InvalidUrl("Invalid download URL.".to_string())),
    }
}

/// Fetches `url` upstream, forwarding the client's Range header when
/// present, and returns a streaming 200/206 response relaying the upstream
/// status and content headers.
pub async fn stream(
    client: &reqwest::Client,
    url: &str,
    range: Option<&HeaderValue>,
    filename: &str,
    extension: &str,
) -> Result<Response, AppError> {
    let upstream_url = validate_upstream_url(url)?;
    let full_name = format!("{}.{}", sanitize_filename(filename), extension);

    let mut request = client
        .get(upstream_url)
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .header(header::ACCEPT, "*/*")
        .header(header::ACCEPT_ENCODING, "identity");
    if let Some(range) = range {
        request = request.header(header::RANGE, range.clone());
    }

    let upstream = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AppError::UpstreamTimeout
        } else {
            tracing::error!("Upstream request failed for {}: {}", url, e);
            AppError::Upstream("Failed to connect to the download source.".to_string())
        }
    })?;

    let status = upstream.status();
    if status.is_client_error() || status.is_server_error() {
        tracing::warn!("Upstream returned {} for {}", status, url);
        return Err(AppError::Upstream(
            "Failed to fetch file from source. The link may have expired.".to_string(),
        ));
    }

    let mut headers = HeaderMap::new();
    let encoded_name = utf8_percent_encode(&full_name, NON_ALPHANUMERIC);
    let disposition = format!(
        "attachment; filename=\"{full_name}\"; filename*=utf-8''{encoded_name}"
    );
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_str(&disposition)?);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if let Some(length) = upstream.headers().get(header::CONTENT_LENGTH) {
        headers.insert(header::CONTENT_LENGTH, length.clone());
    }
    if let Some(content_range) = upstream.headers().get(header::CONTENT_RANGE) {
        headers.insert(header::CONTENT_RANGE, content_range.clone());
    }
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);

    // Once headers are committed, HTTP has no mid-stream error signal; an
    // upstream fault from here on is logged and truncates the stream.
    let body_stream = upstream.bytes_stream().map(|chunk| {
        if let Err(e) = &chunk {
            tracing::warn!("Upstream stream ended early: {}", e);
        }
        chunk
    });

    Ok((status, headers, Body::from_stream(body_stream)).into_response())
}
