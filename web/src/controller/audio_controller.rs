//! Controller for asynchronous audio transcription tasks.
//!
//! A task is created for an audio file already uploaded to object storage and
//! then polled until it reports `finished` or `failed`.

use crate::controller::ApiResponse;
use crate::params::file::FileNameParams;
use crate::response::CreatedTask;
use crate::{AppState, Error};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::task_status::TaskResult;
use log::*;

/// POST submit an uploaded audio file for transcription
#[utoipa::path(
    post,
    path = "/api/v1/audio/transcription-tasks",
    request_body = FileNameParams,
    responses(
        (status = 201, description = "Successfully created a transcription task", body = CreatedTask),
        (status = 422, description = "Unprocessable Entity"),
        (status = 502, description = "Object storage or the ASR service failed"),
        (status = 503, description = "ASR rate limit exhausted")
    )
)]
pub async fn create(
    State(app_state): State<AppState>,
    Json(params): Json<FileNameParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST Create a new transcription task for: {}", params.filename);

    let task = app_state
        .transcriber
        .create_transcription_task(&params.filename)
        .await?;

    debug!("New transcription task: {} at {}", task.task_id, task.submitted_at);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED.into(),
            CreatedTask {
                task_id: task.task_id,
            },
        )),
    ))
}

/// GET the current state of a transcription task
#[utoipa::path(
    get,
    path = "/api/v1/audio/transcription-tasks/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task id returned when the task was created")
    ),
    responses(
        (status = 200, description = "Current task status, with utterances once finished", body = TaskResult),
        (status = 422, description = "Unprocessable Entity"),
        (status = 502, description = "The ASR service failed or answered without a status"),
        (status = 503, description = "ASR rate limit exhausted")
    )
)]
pub async fn read(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET transcription task: {task_id}");

    let result = app_state
        .transcriber
        .get_transcription_task(&task_id)
        .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), result)))
}
