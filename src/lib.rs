pub mod config;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod handlers;
pub mod models;
pub mod proxy;
pub mod rate_limit;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer, ExposeHeaders};

use crate::config::Config;
use crate::extractor::Extractor;
use crate::rate_limit::RateLimiter;

pub use crate::extractor::YtDlpExtractor;

/// The rate-limit window is fixed; only the per-window budget is configurable.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

// --- State Type Aliases ---
pub type ConfigState = Arc<RwLock<Config>>;

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigState,
    pub limiter: Arc<RateLimiter>,
    pub extractor: Arc<dyn Extractor>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, extractor: Arc<dyn Extractor>) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_rpm, RATE_LIMIT_WINDOW));
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.upstream_connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(AppState {
            config: Arc::new(RwLock::new(config)),
            limiter,
            extractor,
            http,
        })
    }
}

/// Builds the application router: API routes, rate limiting over `/api/*`,
/// and CORS exposing the download/rate-limit headers the frontend reads.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state);
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/info", post(handlers::video_info))
        .route("/api/download", get(handlers::download))
        .route("/api/cookies", post(handlers::update_cookies))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::enforce))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.config.read().unwrap().cors_origins.clone();
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(ExposeHeaders::list([
            header::CONTENT_DISPOSITION,
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
        ]));

    if origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}
