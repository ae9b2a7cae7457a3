use serde::Deserialize;
use utoipa::ToSchema;

/// Names an object in the audio bucket
///
/// # Fields
///
/// * `filename` - The object key, used verbatim
#[derive(Debug, Deserialize, ToSchema)]
pub struct FileNameParams {
    pub filename: String,
}
