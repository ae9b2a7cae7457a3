//! Translation of Volcengine ASR status codes into the local task model.
//!
//! The remote service signals the state of a task through the
//! `X-Api-Status-Code` response header, while the transcription itself travels
//! in the JSON body. Only the header decides the local status; the body is read
//! only once the task is finished.

use log::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{external_error, Error, ExternalErrorKind};
use crate::gateway::volcengine_asr::QueryOutcome;

/// Local, three-state view of a transcription task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// One timestamped segment of a finished transcription. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Utterance {
    pub start_time: i64,
    pub end_time: i64,
    pub text: String,
}

/// Outcome of a poll. `result` is only populated for finished tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub result: Option<Vec<Utterance>>,
}

impl TaskResult {
    pub fn running() -> Self {
        Self {
            status: TaskStatus::Running,
            result: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
        }
    }

    pub fn finished(utterances: Vec<Utterance>) -> Self {
        Self {
            status: TaskStatus::Finished,
            result: Some(utterances),
        }
    }
}

/// Status codes the ASR service reports in `X-Api-Status-Code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatusCode {
    Success,
    Running,
    Pending,
    SilentAudio,
    InvalidParams,
    EmptyAudio,
    InvalidAudioFormat,
    ServerBusy,
    /// Any other code from the client (4xxxxxxx) or server (5xxxxxxx) error families.
    OtherFailure(String),
}

impl RemoteStatusCode {
    pub const SUCCESS: &'static str = "20000000";
    pub const RUNNING: &'static str = "20000001";
    pub const PENDING: &'static str = "20000002";
    pub const SILENT_AUDIO: &'static str = "20000003";
    pub const INVALID_PARAMS: &'static str = "45000001";
    pub const EMPTY_AUDIO: &'static str = "45000002";
    pub const INVALID_AUDIO_FORMAT: &'static str = "45000151";
    pub const SERVER_BUSY: &'static str = "55000031";

    /// Classifies a raw header value. Returns `None` for values that are not a
    /// status code the service is known to emit.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim();
        if code.len() != 8 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let status = match code {
            Self::SUCCESS => Self::Success,
            Self::RUNNING => Self::Running,
            Self::PENDING => Self::Pending,
            Self::SILENT_AUDIO => Self::SilentAudio,
            Self::INVALID_PARAMS => Self::InvalidParams,
            Self::EMPTY_AUDIO => Self::EmptyAudio,
            Self::INVALID_AUDIO_FORMAT => Self::InvalidAudioFormat,
            Self::SERVER_BUSY => Self::ServerBusy,
            other if other.starts_with('4') || other.starts_with('5') => {
                Self::OtherFailure(other.to_string())
            }
            _ => return None,
        };
        Some(status)
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Success => Self::SUCCESS,
            Self::Running => Self::RUNNING,
            Self::Pending => Self::PENDING,
            Self::SilentAudio => Self::SILENT_AUDIO,
            Self::InvalidParams => Self::INVALID_PARAMS,
            Self::EmptyAudio => Self::EMPTY_AUDIO,
            Self::InvalidAudioFormat => Self::INVALID_AUDIO_FORMAT,
            Self::ServerBusy => Self::SERVER_BUSY,
            Self::OtherFailure(code) => code,
        }
    }

    pub fn task_status(&self) -> TaskStatus {
        match self {
            Self::Success => TaskStatus::Finished,
            Self::Running | Self::Pending => TaskStatus::Running,
            Self::SilentAudio
            | Self::InvalidParams
            | Self::EmptyAudio
            | Self::InvalidAudioFormat
            | Self::ServerBusy
            | Self::OtherFailure(_) => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponseBody {
    result: RemoteResult,
}

#[derive(Debug, Deserialize)]
struct RemoteResult {
    #[serde(default)]
    utterances: Option<Vec<RemoteUtterance>>,
}

/// Remote utterances carry words, confidences and more; only timing and text are kept.
#[derive(Debug, Deserialize)]
struct RemoteUtterance {
    start_time: i64,
    end_time: i64,
    text: String,
}

impl From<RemoteUtterance> for Utterance {
    fn from(remote: RemoteUtterance) -> Self {
        Self {
            start_time: remote.start_time,
            end_time: remote.end_time,
            text: remote.text,
        }
    }
}

/// Maps a raw query outcome onto the local task model.
///
/// A missing or unrecognizable status header is an error, never a default status.
pub fn translate(task_id: &str, outcome: &QueryOutcome) -> Result<TaskResult, Error> {
    let raw_code = outcome.status_code.as_deref().ok_or_else(|| {
        warn!("Query for task {task_id} returned no status code header");
        external_error(
            ExternalErrorKind::MalformedResponse,
            &format!(
                "Query task failed and the response headers are: {}",
                outcome.headers
            ),
        )
    })?;

    let code = RemoteStatusCode::parse(raw_code).ok_or_else(|| {
        warn!("Query for task {task_id} returned unknown status code {raw_code}");
        external_error(
            ExternalErrorKind::MalformedResponse,
            &format!(
                "Unknown status code {raw_code}; response headers are: {}",
                outcome.headers
            ),
        )
    })?;

    match code.task_status() {
        TaskStatus::Finished => {
            let utterances = parse_utterances(&outcome.body)?;
            info!(
                "Transcription task {task_id} finished with {} utterances",
                utterances.len()
            );
            Ok(TaskResult::finished(utterances))
        }
        TaskStatus::Running => {
            debug!("Transcription task {task_id} is still running ({})", code.code());
            Ok(TaskResult::running())
        }
        TaskStatus::Failed => {
            error!(
                "Transcription task {task_id} failed with code {}, message: {:?}, log id: {:?}",
                code.code(),
                outcome.message,
                outcome.log_id
            );
            Ok(TaskResult::failed())
        }
    }
}

fn parse_utterances(body: &str) -> Result<Vec<Utterance>, Error> {
    let body: QueryResponseBody = serde_json::from_str(body).map_err(|e| {
        warn!("Failed to parse finished transcription body: {e:?}");
        external_error(
            ExternalErrorKind::MalformedResponse,
            &format!("Invalid transcription result body: {e}"),
        )
    })?;

    Ok(body
        .result
        .utterances
        .unwrap_or_default()
        .into_iter()
        .map(Utterance::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainErrorKind;
    use serde_json::json;

    fn outcome(code: Option<&str>, body: &str) -> QueryOutcome {
        QueryOutcome {
            status_code: code.map(str::to_string),
            message: None,
            log_id: Some("log-1".to_string()),
            headers: "x-tt-logid: log-1".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_every_known_code_maps_to_one_status() {
        let cases = [
            ("20000000", TaskStatus::Finished),
            ("20000001", TaskStatus::Running),
            ("20000002", TaskStatus::Running),
            ("20000003", TaskStatus::Failed),
            ("45000001", TaskStatus::Failed),
            ("45000002", TaskStatus::Failed),
            ("45000151", TaskStatus::Failed),
            ("55000031", TaskStatus::Failed),
            ("45999999", TaskStatus::Failed),
            ("55000000", TaskStatus::Failed),
        ];

        for (raw, expected) in cases {
            let code = RemoteStatusCode::parse(raw).expect(raw);
            assert_eq!(code.task_status(), expected, "code {raw}");
            assert_eq!(code.code(), raw);
        }
    }

    #[test]
    fn test_undefined_codes_are_not_recognized() {
        for raw in ["", "OK", "2000000", "200000000", "2000000x", "20000099", "30000000"] {
            assert_eq!(RemoteStatusCode::parse(raw), None, "code {raw:?}");
        }
    }

    #[test]
    fn test_finished_projects_utterances_in_order() {
        let body = json!({
            "audio_info": {"duration": 900},
            "result": {
                "text": "hi there",
                "utterances": [
                    {"start_time": 0, "end_time": 500, "text": "hi", "definite": true, "words": []},
                    {"start_time": 500, "end_time": 900, "text": "there", "words": [{"text": "there"}]}
                ]
            }
        })
        .to_string();

        let result = translate("task-1", &outcome(Some("20000000"), &body)).unwrap();
        assert_eq!(
            result,
            TaskResult::finished(vec![
                Utterance {
                    start_time: 0,
                    end_time: 500,
                    text: "hi".to_string()
                },
                Utterance {
                    start_time: 500,
                    end_time: 900,
                    text: "there".to_string()
                },
            ])
        );

        let serialized = serde_json::to_value(&result).unwrap();
        assert_eq!(
            serialized,
            json!({
                "status": "finished",
                "result": [
                    {"start_time": 0, "end_time": 500, "text": "hi"},
                    {"start_time": 500, "end_time": 900, "text": "there"}
                ]
            })
        );
    }

    #[test]
    fn test_finished_with_no_utterances_is_empty_not_error() {
        let body = json!({"result": {"text": "", "utterances": []}}).to_string();
        let result = translate("task-1", &outcome(Some("20000000"), &body)).unwrap();
        assert_eq!(result, TaskResult::finished(vec![]));

        let body = json!({"result": {"text": ""}}).to_string();
        let result = translate("task-1", &outcome(Some("20000000"), &body)).unwrap();
        assert_eq!(result, TaskResult::finished(vec![]));
    }

    #[test]
    fn test_pending_and_running_have_null_result() {
        for code in ["20000001", "20000002"] {
            let result = translate("task-1", &outcome(Some(code), "{}")).unwrap();
            assert_eq!(result, TaskResult::running());
            assert_eq!(
                serde_json::to_value(&result).unwrap(),
                json!({"status": "running", "result": null})
            );
        }
    }

    #[test]
    fn test_failure_codes_are_returned_as_data() {
        let result = translate("task-1", &outcome(Some("45000002"), "{}")).unwrap();
        assert_eq!(result, TaskResult::failed());
    }

    #[test]
    fn test_missing_status_header_is_malformed() {
        let err = translate("task-1", &outcome(None, "{}")).unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::MalformedResponse)
        );
        assert!(err.detail().contains("x-tt-logid: log-1"));
    }

    #[test]
    fn test_unknown_status_header_is_malformed_not_running() {
        let err = translate("task-1", &outcome(Some("garbage"), "{}")).unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::MalformedResponse)
        );
    }

    #[test]
    fn test_unparseable_finished_body_is_malformed() {
        let err = translate("task-1", &outcome(Some("20000000"), "not json")).unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::MalformedResponse)
        );
    }
}
