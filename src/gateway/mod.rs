//! HTTP gateway: the two routes the companion exposes.
//!
//! `POST /chat` runs a full conversation turn; `GET /health` reports process
//! and memory-backend liveness.

use crate::agent::{ChatMessage, ConversationTurn, TurnOutcome};
use crate::config::GatewayConfig;
use crate::memory::MemoryRepository;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

pub struct GatewayState {
    pub turn: Arc<ConversationTurn>,
    pub repository: Arc<MemoryRepository>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub user_id: String,
    pub intent: Option<String>,
    pub memory_ids: Vec<String>,
}

impl From<TurnOutcome> for ChatResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            response: outcome.response,
            user_id: outcome.user_id,
            intent: outcome.intent,
            memory_ids: outcome.memory_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub structured_store: bool,
    pub vector_index: bool,
}

pub fn router(state: Arc<GatewayState>, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state)
}

pub async fn serve(state: Arc<GatewayState>, config: &GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "gateway listening");
    axum::serve(listener, router(state, config)).await?;
    Ok(())
}

async fn chat(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    if request.user_id.trim().is_empty() || request.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "user_id and message are required".to_string(),
        ));
    }

    match state
        .turn
        .process(&request.user_id, &request.message, &request.history)
        .await
    {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            error!(user_id = %request.user_id, error = %e, "chat request failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let (structured_store, vector_index) = state.repository.health_check().await;
    Json(HealthResponse {
        status: if structured_store { "healthy" } else { "degraded" },
        structured_store,
        vector_index,
    })
}
