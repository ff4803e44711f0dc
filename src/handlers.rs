use crate::app::AppState;
use crate::auth::{AuthUser, Claims};
use crate::error::{AppError, AppResult};
use crate::events::StreamEvent;
use crate::models::{ChatRequest, ChatResponse, HealthResponse, LoginForm, ServiceInfo, TokenResponse};
use axum::{
    Form,
    extract::{Json, State},
    response::Json as ResponseJson,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Service banner
pub async fn root() -> ResponseJson<ServiceInfo> {
    ResponseJson(ServiceInfo::current())
}

/// Health check handler
/// Returns the service status and health information
pub async fn health_check() -> AppResult<ResponseJson<HealthResponse>> {
    debug!("Health check endpoint called");

    let response = HealthResponse::ok();

    info!("Health check successful");
    Ok(ResponseJson(response))
}

/// Exchanges the configured username and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<ResponseJson<TokenResponse>> {
    if !state.auth.authenticate(&form.username, &form.password) {
        warn!("Failed login attempt for user {}", form.username);
        return Err(AppError::Unauthorized(
            "Incorrect username or password".to_string(),
        ));
    }

    let token = state
        .auth
        .issue_token(&form.username)
        .map_err(|e| AppError::InternalServerError(format!("Could not issue token: {}", e)))?;
    info!("Issued token for user {}", form.username);
    Ok(ResponseJson(TokenResponse::bearer(token)))
}

/// Claims of the authenticated caller
pub async fn me(AuthUser(claims): AuthUser) -> ResponseJson<Claims> {
    ResponseJson(claims)
}

fn validate(payload: &ChatRequest) -> AppResult<()> {
    if payload.is_valid() {
        Ok(())
    } else {
        Err(AppError::ValidationError(
            "Message cannot be empty or only whitespace".to_string(),
        ))
    }
}

/// Runs one agent turn and returns its final reply
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChatRequest>,
) -> AppResult<ResponseJson<ChatResponse>> {
    info!("Chat endpoint called by {} (thread {:?})", user.sub, payload.thread_id());
    validate(&payload)?;

    let response = state
        .chat
        .run_turn(&payload, None)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Error processing request: {}", e)))?;

    info!("Successfully processed message for thread {}", response.thread_id);
    Ok(ResponseJson(response))
}

/// Runs one agent turn, streaming tool activity and the reply as SSE
pub async fn chat_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    info!("Streaming chat called by {} (thread {:?})", user.sub, payload.thread_id());
    validate(&payload)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let chat = state.chat.clone();
    tokio::spawn(async move {
        let last = match chat.run_turn(&payload, Some(tx.clone())).await {
            Ok(response) => {
                let _ = tx.send(StreamEvent::Message {
                    content: response.response.clone(),
                });
                StreamEvent::Done {
                    thread_id: response.thread_id,
                    result: response.response,
                }
            }
            Err(e) => {
                warn!("Streaming turn failed: {}", e);
                StreamEvent::Error {
                    message: e.to_string(),
                }
            }
        };
        let _ = tx.send(last);
    });

    let stream = futures::stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        let event = rx.recv().await?;
        let next = (!event.is_terminal()).then_some(rx);
        Some((Event::default().json_data(&event), next))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
