//! Sentiment Server - HTTP API for the sentiment classifier

pub mod config;
pub mod error;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use sentiment_core::{PredictionResult, PredictionService, TextInput};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

pub use config::ServerConfig;
pub use error::{ApiError, ErrorResponse};

/// Body of `GET /healthz`. Clients match on this exact string.
pub const HEALTH_ACK: &str = "succesfully running";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

async fn healthz() -> Json<[&'static str; 1]> {
    Json([HEALTH_ACK])
}

async fn predict(
    State(state): State<AppState>,
    Json(input): Json<TextInput>,
) -> Result<Json<PredictionResult>, ApiError> {
    let result = state.service.predict(input).await?;
    Ok(Json(result))
}

/// Full URL of a request; origin-form URIs are completed from the `Host` header.
fn request_url(request: &Request) -> String {
    let uri = request.uri();
    if uri.authority().is_some() {
        return uri.to_string();
    }
    match request.headers().get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("{}://{}{}", uri.scheme_str().unwrap_or("http"), host, uri),
        None => uri.to_string(),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let url = request_url(&request);
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} status={} completed_in={:.4}s",
        method,
        url,
        response.status().as_u16(),
        start.elapsed().as_secs_f64()
    );
    response
}

/// Build the application router.
///
/// `static_dir` holds `index.html`, served at `/`, and any assets it
/// references under `/static`.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let static_dir = static_dir.as_ref();

    Router::new()
        .route("/healthz", get(healthz))
        .route("/predict/", post(predict))
        .route("/predict", post(predict))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
