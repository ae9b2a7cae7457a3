//! Response payloads that have no counterpart in the domain layer.

use serde::Serialize;
use utoipa::ToSchema;

/// A presigned URL the client can PUT the audio file to
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadUrl {
    pub upload_url: String,
}

/// The identifier to poll a newly created transcription task with
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedTask {
    pub task_id: String,
}
