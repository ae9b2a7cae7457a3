use crate::controller::ApiResponse;
use crate::{AppState, Error};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::gateway::llm::ChatRequest;
use log::*;

/// POST forward chat messages to the configured LLM
#[utoipa::path(
    post,
    path = "/api/v1/chat/completions",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The provider's chat completion, unmodified"),
        (status = 422, description = "Unprocessable Entity"),
        (status = 500, description = "No LLM is configured"),
        (status = 502, description = "The LLM provider failed")
    )
)]
pub async fn create(
    State(app_state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, Error> {
    debug!(
        "POST chat completion with {} message(s)",
        request.messages.len()
    );

    let completion = app_state.llm()?.chat_completion(&request).await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), completion)))
}
