//! HTTP routes
//!
//! Generation handlers follow one flow: validate the body, take a credential
//! from the pool, call the engine, and quarantine the credential when the
//! engine blames it.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use key_pool::{Credential, KeyPool};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{EngineError, ImageEngine, TextEngine, TextRequest};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::metrics;
use crate::templates::{self, TemplateArgs};

const DEFAULT_TEMPERATURE: f64 = 0.7;
const MAX_TEMPERATURE: f64 = 2.0;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub text_pool: Arc<KeyPool>,
    pub image_pool: Arc<KeyPool>,
    pub text_engine: Arc<dyn TextEngine>,
    pub image_engine: Arc<dyn ImageEngine>,
    pub default_model: Arc<str>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Build the router. `max_connections` caps concurrently served requests.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/templates/text", get(list_templates))
        .route("/generate/text", post(generate_text))
        .route("/generate/image", post(generate_image))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TextGenerationBody {
    prompt: Option<String>,
    template_name: Option<String>,
    template_args: Option<TemplateArgs>,
    #[serde(alias = "modelo")]
    model: Option<String>,
    #[serde(default = "default_temperature", alias = "temperatura")]
    temperature: f64,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl TextGenerationBody {
    /// The final prompt: given directly, or rendered from a template.
    fn resolve_prompt(&self) -> Result<String, ApiError> {
        match (&self.prompt, &self.template_name) {
            (Some(_), Some(_)) => Err(ApiError::Validation(
                "Provide either 'prompt' or 'template_name', not both".into(),
            )),
            (None, None) => Err(ApiError::Validation(
                "Either 'prompt' or 'template_name' is required".into(),
            )),
            (Some(prompt), None) => {
                if self.template_args.is_some() {
                    return Err(ApiError::Validation(
                        "'template_args' requires 'template_name'".into(),
                    ));
                }
                if prompt.trim().is_empty() {
                    return Err(ApiError::Validation("'prompt' must not be empty".into()));
                }
                Ok(prompt.clone())
            }
            (None, Some(name)) => Ok(templates::render(name, self.template_args.as_ref())?),
        }
    }

    fn validate_temperature(&self) -> Result<(), ApiError> {
        if (0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            Ok(())
        } else {
            Err(ApiError::Validation(format!(
                "'temperature' must be between 0 and {MAX_TEMPERATURE}"
            )))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImageGenerationBody {
    prompt: String,
}

async fn root() -> Json<Value> {
    Json(serde_json::json!({
        "status": "online",
        "service": "generation-api",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/templates/text", "/generate/text", "/generate/image", "/health", "/metrics"],
    }))
}

async fn list_templates() -> Json<Value> {
    Json(templates::catalog())
}

async fn generate_text(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let result = text_generation(&state, &body).await;
    respond("/generate/text", started, result)
}

async fn generate_image(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let result = image_generation(&state, &body).await;
    respond("/generate/image", started, result)
}

async fn text_generation(state: &AppState, body: &[u8]) -> Result<Value, ApiError> {
    let request: TextGenerationBody = parse_body(body)?;
    request.validate_temperature()?;
    let prompt = request.resolve_prompt()?;
    let model = request
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(&*state.default_model)
        .to_string();

    let credential = state
        .text_pool
        .acquire()
        .await?
        .ok_or(ApiError::NoCredential("text"))?;

    let text_request = TextRequest {
        prompt,
        model,
        temperature: request.temperature,
    };
    match state.text_engine.generate(&text_request, &credential).await {
        Ok(text) => {
            info!(
                credential = credential.name(),
                model = %text_request.model,
                "text generated"
            );
            Ok(serde_json::json!({
                "generated_text": text,
                "key_used": credential.name(),
            }))
        }
        Err(err) => {
            let engine = state.text_engine.id();
            Err(engine_failure(&state.text_pool, engine, &credential, err).await)
        }
    }
}

async fn image_generation(state: &AppState, body: &[u8]) -> Result<Value, ApiError> {
    let request: ImageGenerationBody = parse_body(body)?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::Validation("'prompt' must not be empty".into()));
    }

    let credential = state
        .image_pool
        .acquire()
        .await?
        .ok_or(ApiError::NoCredential("image"))?;

    match state.image_engine.generate(&request.prompt, &credential).await {
        Ok(urls) if urls.is_empty() => {
            warn!(credential = credential.name(), "image provider returned no images");
            Err(ApiError::NoImages)
        }
        Ok(urls) => {
            info!(
                credential = credential.name(),
                images = urls.len(),
                "images generated"
            );
            Ok(serde_json::json!({
                "image_urls": urls,
                "key_used": credential.name(),
            }))
        }
        Err(err) => {
            let engine = state.image_engine.id();
            Err(engine_failure(&state.image_pool, engine, &credential, err).await)
        }
    }
}

/// Record an engine failure and quarantine the credential if it is to blame.
///
/// A store failure while quarantining replaces the engine error.
async fn engine_failure(
    pool: &KeyPool,
    engine: &str,
    credential: &Credential,
    err: EngineError,
) -> ApiError {
    metrics::record_engine_error(engine, err.label());
    warn!(
        engine,
        credential = credential.name(),
        error_type = err.label(),
        error = %err,
        "generation failed"
    );
    if err.quarantines_credential() {
        if let Err(store_err) = pool.release_bad(credential.quarantine_key()).await {
            return ApiError::Store(store_err);
        }
    }
    ApiError::Engine(err)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))
}

/// Turn a handler result into a response, tagging it with a request id and
/// recording metrics.
fn respond(route: &'static str, started: Instant, result: Result<Value, ApiError>) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let mut response = match result {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(route, request_id = %request_id, status = status.as_u16(), error = %err, "request failed");
            } else {
                warn!(route, request_id = %request_id, status = status.as_u16(), error = %err, "request rejected");
            }
            err.into_response()
        }
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    metrics::record_request(
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// 200 while every pool has credentials loaded, else 503.
///
/// A pool whose credentials are all quarantined still counts as serving:
/// its next `acquire()` resets the quarantine.
async fn health(State(state): State<AppState>) -> Response {
    let mut pools = serde_json::Map::new();
    let mut healthy = true;

    for (label, pool) in [("text", &state.text_pool), ("image", &state.image_pool)] {
        let entry = match pool.status().await {
            Ok(status) => {
                if status["credentials_total"].as_u64() == Some(0) {
                    healthy = false;
                }
                status
            }
            Err(e) => {
                healthy = false;
                serde_json::json!({
                    "key_type": pool.key_type(),
                    "status": "error",
                    "error": e.to_string(),
                })
            }
        };
        pools.insert(label.to_string(), entry);
    }

    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "pools": pools,
        })),
    )
        .into_response()
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
