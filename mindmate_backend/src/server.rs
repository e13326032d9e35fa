use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::runtime::BackendRuntime;
use crate::schema::{BannerResponse, ChatRequest, ChatResponse, ErrorResponse, HealthResponse};
use crate::workflow::MindMateWorkflow;

const SERVICE_NAME: &str = "mindmate-agent";

#[derive(Clone)]
pub struct ServerState {
    pub workflow: Arc<MindMateWorkflow>,
    pub max_message_chars: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn serve_backend(runtime: BackendRuntime) -> Result<()> {
    let bind_addr = std::env::var("MINDMATE_BACKEND_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse::<SocketAddr>()
        .context("Invalid MINDMATE_BACKEND_BIND (expected host:port)")?;

    let state = Arc::new(ServerState {
        workflow: runtime.workflow.clone(),
        max_message_chars: runtime.config.max_message_chars,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind backend server to {}", bind_addr))?;
    tracing::info!("MindMate backend listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("Backend server failed")?;
    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(cors)
}

async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "MindMate Chatbot Agent is running".to_string(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

async fn chat(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    request
        .validate(state.max_message_chars)
        .map_err(|e| bad_request(e.to_string()))?;

    tracing::info!(
        "Chat request for user {}: {} recent messages, {} activities, voice: {}",
        request.effective_user_id(),
        request.recent_messages.len(),
        request.user_activities.len(),
        request.voice_analysis.is_some()
    );

    match state.workflow.process(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::error!("Error processing chat: {}", e);
            Err(internal_error(format!("Chat processing failed: {}", e)))
        }
    }
}

fn bad_request(detail: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { detail }))
}

fn internal_error(detail: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { detail }))
}
