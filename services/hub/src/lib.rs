pub mod channel;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod session;
pub mod state;
pub mod store;
pub mod token;
pub mod voice_client;
pub mod ws;

pub use state::HubState;

use std::path::PathBuf;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::Config;

pub fn build_router(state: HubState, static_dir: Option<PathBuf>) -> Router {
    let cors = build_cors(&state.config);

    let router = Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(cors);

    let router = match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => router.fallback(fallback_404),
    };

    router.with_state(state)
}

fn build_cors(config: &Config) -> CorsLayer {
    let allow_origin = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let allow_headers = if config.cors_allowed_headers.iter().any(|h| h == "*") {
        AllowHeaders::any()
    } else {
        let headers: Vec<HeaderName> = config
            .cors_allowed_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();
        AllowHeaders::list(headers)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers(allow_headers)
        .allow_credentials(config.cors_allow_credentials)
        .allow_methods([
            Method::OPTIONS,
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Html("<!DOCTYPE html><html><head><title>404</title></head><body><h1>404</h1><p>Not found.</p></body></html>"),
    )
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
