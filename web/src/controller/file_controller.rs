use crate::controller::ApiResponse;
use crate::params::file::FileNameParams;
use crate::response::UploadUrl;
use crate::{AppState, Error};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::error::invalid_error;
use log::*;

/// POST a presigned URL for uploading an audio file
#[utoipa::path(
    post,
    path = "/api/v1/files/upload-urls",
    request_body = FileNameParams,
    responses(
        (status = 200, description = "Successfully generated an upload URL", body = UploadUrl),
        (status = 422, description = "Unprocessable Entity"),
        (status = 502, description = "Object storage failed to sign the URL")
    )
)]
pub async fn create_upload_url(
    State(app_state): State<AppState>,
    Json(params): Json<FileNameParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST upload URL for file: {}", params.filename);

    if params.filename.trim().is_empty() {
        return Err(invalid_error("filename must not be empty").into());
    }

    let upload_url = app_state
        .storage
        .generate_upload_url(&params.filename)
        .await?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK.into(),
        UploadUrl { upload_url },
    )))
}
