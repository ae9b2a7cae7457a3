use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use uuid::Uuid;

use crate::error::{invalid_error, Error};
use crate::gateway::object_storage::Storage;
use crate::gateway::volcengine_asr::AsrClient;
use crate::task_status::{self, TaskResult, TaskStatus};

// Cleared wholesale once this many tasks are remembered.
const STATUS_WATCH_CAPACITY: usize = 10_000;

/// A task accepted by the ASR service. Lives only as long as the submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionTask {
    pub task_id: String,
    pub source_audio_url: String,
    pub submitted_at: DateTime<Utc>,
    pub app_key: String,
}

/// Remembers terminal observations so that a remote task moving back out of a
/// terminal state gets logged. Results are never altered.
#[derive(Debug, Default)]
pub struct StatusWatch {
    terminal: DashMap<String, TaskStatus>,
}

impl StatusWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `status` for `task_id`; returns false if it contradicts an earlier terminal status.
    pub fn observe(&self, task_id: &str, status: TaskStatus) -> bool {
        if let Some(previous) = self.terminal.get(task_id).map(|s| *s) {
            if previous != status {
                warn!(
                    "Transcription task {task_id} was {previous:?} but is now reported {status:?}"
                );
                return false;
            }
            return true;
        }

        if status.is_terminal() {
            if self.terminal.len() >= STATUS_WATCH_CAPACITY {
                debug!("Status watch is full, forgetting {} tasks", self.terminal.len());
                self.terminal.clear();
            }
            self.terminal.insert(task_id.to_string(), status);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.terminal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminal.is_empty()
    }
}

/// Submits audio files for transcription and polls their results.
pub struct Transcriber {
    storage: Arc<dyn Storage>,
    asr: AsrClient,
    watch: StatusWatch,
}

impl Transcriber {
    pub fn new(storage: Arc<dyn Storage>, asr: AsrClient) -> Self {
        Self {
            storage,
            asr,
            watch: StatusWatch::new(),
        }
    }

    /// Submits the stored object `filename` for transcription.
    ///
    /// A fresh task id is generated for every call; failures are not retried.
    pub async fn create_transcription_task(
        &self,
        filename: &str,
    ) -> Result<TranscriptionTask, Error> {
        if filename.trim().is_empty() {
            return Err(invalid_error("filename must not be empty"));
        }
        info!("Creating transcription task for file: {filename}");

        let source_audio_url = self.storage.generate_download_url(filename).await?;
        let task_id = Uuid::new_v4().to_string();
        let submitted_at = Utc::now();

        let outcome = self.asr.submit(&source_audio_url, &task_id).await?;
        info!(
            "Transcription task created with ID: {} (log id {:?})",
            outcome.task_id, outcome.log_id
        );

        Ok(TranscriptionTask {
            task_id: outcome.task_id,
            source_audio_url,
            submitted_at,
            app_key: self.asr.app_key().to_string(),
        })
    }

    /// Polls the remote service once for `task_id`.
    pub async fn get_transcription_task(&self, task_id: &str) -> Result<TaskResult, Error> {
        if task_id.trim().is_empty() {
            return Err(invalid_error("task_id must not be empty"));
        }
        debug!("Querying transcription task status: {task_id}");

        let outcome = self.asr.query(task_id).await?;
        let result = task_status::translate(task_id, &outcome)?;
        self.watch.observe(task_id, result.status);
        Ok(result)
    }
}
