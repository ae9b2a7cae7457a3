//! Business logic for submitting audio to a speech recognition service and
//! collecting the transcription, plus the outbound gateways it relies on.

pub use transcription_task::{StatusWatch, Transcriber, TranscriptionTask};

pub mod error;
pub mod rate_limit;
pub mod task_status;
pub mod transcription_task;

pub mod gateway;
