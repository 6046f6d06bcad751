//! HTTP surface of the conversion service
//!
//! Three routes: `GET /` (metadata), `GET /health` (liveness), and
//! `POST /convert` (the authenticated conversion endpoint). All error
//! responses carry a JSON `{"error": ...}` body with the status mapped from
//! the error taxonomy in [`crate::error`].

use crate::auth::ApiKey;
use crate::pool::RenderPool;
use crate::validate::ImageValidator;
use crate::{Error, ImageFormat, RenderConfig, RenderOptions, Result, DEFAULT_JPEG_QUALITY};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Configuration assembled by the binary from flags and environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub render: RenderConfig,
    pub render_workers: usize,
}

/// Wire shape of the conversion request body
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub html: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub quality: Option<u8>,
}

impl ConvertRequest {
    /// Apply defaults and validate into render options
    pub fn render_options(&self) -> Result<RenderOptions> {
        let format = ImageFormat::parse(self.format.as_deref().unwrap_or("png"))?;
        RenderOptions::new(
            self.width.unwrap_or(1920),
            self.height.unwrap_or(1080),
            format,
            self.quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        )
    }
}

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    api_key: Arc<ApiKey>,
    validator: Arc<ImageValidator>,
    pool: Arc<RenderPool>,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            api_key: Arc::new(ApiKey::new(&config.api_key)),
            validator: Arc::new(ImageValidator::new()?),
            pool: Arc::new(RenderPool::new(
                config.render.clone(),
                config.render_workers,
            )),
        })
    }
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/convert", post(convert))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "ImageFlow",
        "description": "Transform your HTML into stunning images with the flow of a single API call",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoint": "POST /convert",
        "health": "/health",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.api_key.check_bearer(bearer)?;

    // Body is deserialized by hand so malformed JSON lands in the same
    // error taxonomy as out-of-range parameters
    let request: ConvertRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::InvalidParam(format!("Malformed request body: {}", e)))?;
    let options = request.render_options()?;

    // Every external image must pass validation before Chrome sees the markup
    state.validator.validate_html(&request.html).await?;

    info!(
        "Converting {}x{} {}",
        options.viewport.width,
        options.viewport.height,
        options.format.as_str()
    );
    let bytes = state.pool.render(request.html, options).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, options.format.content_type())],
        bytes,
    )
        .into_response())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::InvalidParam(_) => StatusCode::BAD_REQUEST,
            Error::DisallowedResource { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Render(_) | Error::Init(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
