use crate::controller::{
    audio_controller, chat_controller, file_controller, health_check_controller,
};
use crate::{params, response, AppState};
use axum::{
    routing::{get, post},
    Router,
};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Scribe Platform API"
        ),
        paths(
            audio_controller::create,
            audio_controller::read,
            chat_controller::create,
            file_controller::create_upload_url,
            health_check_controller::health_check,
        ),
        components(
            schemas(
                domain::task_status::TaskResult,
                domain::task_status::TaskStatus,
                domain::task_status::Utterance,
                domain::gateway::llm::ChatRequest,
                domain::gateway::llm::ChatMessage,
                params::file::FileNameParams,
                response::UploadUrl,
                response::CreatedTask,
            )
        ),
        tags(
            (name = "scribe_platform", description = "Audio transcription and chat completion API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(app_state))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn api_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(audio_routes(app_state.clone()))
        .merge(file_routes(app_state.clone()))
        .merge(chat_routes(app_state))
}

fn audio_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/audio/transcription-tasks",
            post(audio_controller::create),
        )
        .route(
            "/audio/transcription-tasks/{task_id}",
            get(audio_controller::read),
        )
        .with_state(app_state)
}

fn file_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/files/upload-urls", post(file_controller::create_upload_url))
        .with_state(app_state)
}

fn chat_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/chat/completions", post(chat_controller::create))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}
