//! HTTP server: `POST /api/chat` streaming Server-Sent Events, and `GET /health`.
//!
//! Services are built once by [`build_state`] and shared with every handler
//! through axum's `State` extractor.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::chat::classify::build_classifier;
use crate::chat::generation::{build_generator, ChatMessage};
use crate::chat::pipeline::{ChatPipeline, ChatTurn};
use crate::chat::prompt::Mode;
use crate::chat::rate_limit::{client_id, RateLimiter};
use crate::chat::retrieval::build_retriever;
use crate::config::ChatConfig;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ChatPipeline>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Construct the long-lived services from config.
pub fn build_state(config: &ChatConfig) -> anyhow::Result<AppState> {
    let generator = build_generator(&config.generation)?;
    let retriever = build_retriever(&config.retrieval)?;

    let pipeline = ChatPipeline::new(
        generator,
        retriever,
        config.generation.clone(),
        config.citations.clone(),
    )
    .with_classifier(build_classifier(&config.retrieval));

    Ok(AppState {
        pipeline: Arc::new(pipeline),
        rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Start the HTTP server and run until ctrl-c.
pub async fn serve(config: ChatConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr();
    let state = build_state(&config)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "chat server listening at http://{bind_addr}/api/chat");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down chat server");
        })
        .await?;

    Ok(())
}

// ============ Error response ============

/// Error response with a flat `{ "error": ..., "details": ... }` body.
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    fn too_many_requests() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded. Please try again soon.".to_string(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid request body".to_string(),
            details: Some(rejection.body_text()),
        }
    }
}

// ============ POST /api/chat ============

/// Request body for `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub mode: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let client = client_id(&headers);
    if state.rate_limiter.is_limited(&client) {
        tracing::warn!(client = %client, "rate limit exceeded");
        return Err(ApiError::too_many_requests());
    }

    let Json(body) = body?;
    let messages = body
        .messages
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Messages array is required"))?;

    let query = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| ApiError::bad_request("No user message found"))?;

    let turn = ChatTurn {
        request_id: uuid::Uuid::now_v7().to_string(),
        query,
        mode: Mode::parse_lenient(body.mode.as_deref()),
    };
    tracing::info!(request_id = %turn.request_id, client = %client, mode = %turn.mode, "chat request");

    let events = state
        .pipeline
        .clone()
        .respond(turn)
        .map(|event| Ok::<Event, Infallible>(Event::default().data(event.to_data())));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
