use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The fixed vocabulary of extraction failure categories surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    PrivateVideo,
    AgeRestricted,
    UnsupportedSite,
    Unavailable,
    Copyright,
    Timeout,
    GeoRestricted,
    RateLimit,
    ServerError,
}

impl ExtractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionKind::PrivateVideo => "private_video",
            ExtractionKind::AgeRestricted => "age_restricted",
            ExtractionKind::UnsupportedSite => "unsupported_site",
            ExtractionKind::Unavailable => "unavailable",
            ExtractionKind::Copyright => "copyright",
            ExtractionKind::Timeout => "timeout",
            ExtractionKind::GeoRestricted => "geo_restricted",
            ExtractionKind::RateLimit => "rate_limit",
            ExtractionKind::ServerError => "server_error",
        }
    }

    /// Classifies an extractor failure message by keyword.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("private") {
            ExtractionKind::PrivateVideo
        } else if lower.contains("age") || lower.contains("sign in") || lower.contains("login") {
            ExtractionKind::AgeRestricted
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ExtractionKind::UnsupportedSite
        } else if lower.contains("unavailable") || lower.contains("removed") {
            ExtractionKind::Unavailable
        } else if lower.contains("copyright") {
            ExtractionKind::Copyright
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ExtractionKind::Timeout
        } else if lower.contains("geo") || lower.contains("country") {
            ExtractionKind::GeoRestricted
        } else if lower.contains("too many requests") || lower.contains("rate limit") {
            ExtractionKind::RateLimit
        } else {
            ExtractionKind::ServerError
        }
    }
}

// Define our custom error type
pub enum AppError {
    /// The client exceeded the sliding-window limit; carries the advertised
    /// back-off in seconds and the configured per-window limit.
    RateLimited { retry_after: u64, limit: u32 },
    /// The extractor failed with a user-facing, classified reason.
    Extraction { kind: ExtractionKind, message: String },
    /// Malformed or disallowed URL, rejected before any network call.
    InvalidUrl(String),
    /// The media origin answered with an error or refused the connection.
    Upstream(String),
    /// The media origin did not answer within the configured timeout.
    UpstreamTimeout,
    BadRequest(String),
    Internal(anyhow::Error),
}

// This implementation allows us to convert our AppError into a valid HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, error_message) = match self {
            AppError::RateLimited { retry_after, limit } => {
                let body = Json(json!({
                    "success": false,
                    "error": "Rate limit exceeded. Please try again later.",
                    "error_type": "rate_limit",
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
                return response;
            }
            AppError::Extraction { kind, message } => (StatusCode::BAD_REQUEST, kind.as_str(), message),
            AppError::InvalidUrl(e) => (StatusCode::BAD_REQUEST, "invalid_url", e),
            AppError::Upstream(e) => (StatusCode::BAD_GATEWAY, "upstream_error", e),
            AppError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "Download timed out. The source server is not responding.".to_string(),
            ),
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, "bad_request", e),
            AppError::Internal(e) => {
                // Log the full error for debugging; the client only sees a generic message.
                tracing::error!("Internal server error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "An unexpected error occurred. Please try again.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "error_type": error_type,
        }));
        (status, body).into_response()
    }
}

// This allows us to use the `?` operator to automatically convert
// any error that implements `std::error::Error` into our `AppError::Internal`.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_known_failure_keywords() {
        let cases = [
            ("This video is private", ExtractionKind::PrivateVideo),
            ("Sign in to confirm your age", ExtractionKind::AgeRestricted),
            ("Unsupported URL: https://example.com", ExtractionKind::UnsupportedSite),
            ("Video unavailable", ExtractionKind::Unavailable),
            ("This video has been removed", ExtractionKind::Unavailable),
            ("Blocked due to copyright claim", ExtractionKind::Copyright),
            ("Connection timed out", ExtractionKind::Timeout),
            ("Not available in your country", ExtractionKind::GeoRestricted),
            ("HTTP Error 429: Too Many Requests", ExtractionKind::RateLimit),
            ("something entirely novel went wrong", ExtractionKind::ServerError),
        ];
        for (message, expected) in cases {
            assert_eq!(ExtractionKind::classify(message), expected, "{message}");
        }
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AppError::RateLimited { retry_after: 17, limit: 30 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
        assert_eq!(response.headers()["x-ratelimit-limit"], "30");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    }

    #[test]
    fn extraction_error_maps_to_bad_request() {
        let err = AppError::Extraction {
            kind: ExtractionKind::GeoRestricted,
            message: "Not available in your country".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
