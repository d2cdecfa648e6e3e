//! HTTP surface: one POST route per configured endpoint, the optional
//! webhook route, and `GET /health`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, trace};
use serde_json::{json, Value};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::client::MessagingClient;
use crate::composer::Composer;
use crate::configuration::{AppConfig, HEALTH_PATH};
use crate::dispatch::{self, DispatchResult, DispatchStatus};
use crate::error::Error;
use crate::registry::FormatterRegistry;
use crate::template::TemplateRenderer;
use crate::webhook::{WebhookAck, WebhookRouter};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Read-only state shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<FormatterRegistry>,
    pub client: Arc<dyn MessagingClient>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub webhook: Arc<WebhookRouter>,
}

impl AppState {
    /// Takes ownership of the loaded config and frozen registry
    pub fn new(
        config: AppConfig,
        registry: FormatterRegistry,
        client: Arc<dyn MessagingClient>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        let config = Arc::new(config);
        let webhook = Arc::new(WebhookRouter::new(
            config.clone(),
            client.clone(),
            renderer.clone(),
        ));
        AppState {
            config,
            registry: Arc::new(registry),
            client,
            renderer,
            webhook,
        }
    }
}

/// Request-level failures of notification endpoints
#[derive(Debug)]
pub enum ApiError {
    InvalidApiKey,
    InvalidPayload(String),
    NoDestination,
    FormatterNotFound(String),
    SendFailed {
        message: String,
        results: Vec<DispatchResult>,
    },
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NoDestination => ApiError::NoDestination,
            Error::FormatterNotFound(name) => ApiError::FormatterNotFound(name),
            other => ApiError::SendFailed {
                message: other.to_string(),
                results: Vec::new(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "invalid_api_key", "message": "Invalid or missing API key"}),
            ),
            ApiError::InvalidPayload(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_payload", "message": message}),
            ),
            ApiError::NoDestination => (
                StatusCode::BAD_REQUEST,
                json!({"error": "no_chat_id", "message": Error::NoDestination.to_string()}),
            ),
            ApiError::FormatterNotFound(name) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "formatter_not_found",
                    "message": Error::FormatterNotFound(name).to_string(),
                }),
            ),
            ApiError::SendFailed { message, results } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "send_failed", "message": message, "results": results}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn check_api_key(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = match expected.filter(|key| !key.is_empty()) {
        Some(key) => key,
        None => return Ok(()),
    };
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::InvalidApiKey)
    }
}

async fn notify(
    state: AppState,
    index: usize,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    check_api_key(state.config.server.api_key.as_deref(), &headers)?;

    let payload: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;
    if !payload.is_object() {
        return Err(ApiError::InvalidPayload(
            "Request body must be a JSON object".to_string(),
        ));
    }

    let endpoint = &state.config.endpoints[index];
    trace!("Payload for {}: {}", endpoint.path, payload);

    let composer = Composer {
        templates: &state.config.templates,
        registry: &state.registry,
        renderer: state.renderer.as_ref(),
    };
    let notification = composer.prepare(endpoint, &payload).map_err(|e| {
        error!("Failed to prepare notification for {}: {}", endpoint.path, e);
        ApiError::from(e)
    })?;

    let report = dispatch::dispatch(state.client.as_ref(), &notification).await;
    match report.status() {
        DispatchStatus::Sent => Ok(Json(json!({"status": "sent", "results": report.results}))
            .into_response()),
        DispatchStatus::Partial => Ok((
            StatusCode::MULTI_STATUS,
            Json(json!({"status": "partial", "results": report.results})),
        )
            .into_response()),
        DispatchStatus::Failed => Err(ApiError::SendFailed {
            message: report.first_error().unwrap_or("delivery failed").to_string(),
            results: report.results,
        }),
    }
}

async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
    Json(state.webhook.handle(&body).await)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "endpoints": state.config.endpoints.len(),
        "formatters": state.registry.list(),
    }))
}

/// Build the router for every configured route
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let mut router = Router::new().route(HEALTH_PATH, get(health));

    for (index, endpoint) in config.endpoints.iter().enumerate() {
        router = router.route(
            &endpoint.path,
            post(
                move |State(state): State<AppState>, headers: HeaderMap, body: Bytes| async move {
                    notify(state, index, headers, body).await
                },
            ),
        );
        info!("Registered endpoint: {}", endpoint.path);
    }

    if config.webhook_enabled() {
        router = router.route(&config.bot.webhook_path, post(webhook));
        info!("Registered webhook endpoint: {}", config.bot.webhook_path);
    }

    router.with_state(state)
}

/// Bind `server.host:server.port` and serve until Ctrl-C
pub async fn serve(state: AppState) -> Result<(), Error> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        Error::configuration(format!("Failed to bind to {}: {}", addr, e))
    })?;
    info!("Telegrify listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
