//! Error types for the `domain` layer.
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in the external services it talks to. The `source` field holds the original error,
/// or a diagnostic message such as the raw response headers of a rejected remote call.
/// Ultimately the various `error_kind`s are used by `web` to return appropriate
/// HTTP status codes and messages to the client.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    /// A required configuration value is missing or unusable.
    Config,
    /// Caller supplied input that can never succeed (blank filename, blank task id, ...).
    Invalid(String),
    Other(String),
}

/// External dependencies the domain layer calls out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalService {
    Asr,
    Storage,
    Llm,
}

impl ExternalService {
    pub fn name(&self) -> &'static str {
        match self {
            ExternalService::Asr => "Volcengine ASR",
            ExternalService::Storage => "Object Storage",
            ExternalService::Llm => "LLM",
        }
    }
}

impl fmt::Display for ExternalService {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    /// The request never produced a usable response (connect, timeout, body read).
    Network(ExternalService),
    /// A pre-signed storage URL could not be produced.
    Storage,
    /// The ASR service did not acknowledge a submitted task with the success sentinel.
    Submission,
    /// The ASR query response lacked a recognizable status header or body.
    MalformedResponse,
    /// No rate limit token became available within the configured wait.
    RateLimited,
    Other(ExternalService, String),
}

impl ExternalErrorKind {
    /// The dependency responsible for this error.
    pub fn service(&self) -> ExternalService {
        match self {
            ExternalErrorKind::Network(service) | ExternalErrorKind::Other(service, _) => *service,
            ExternalErrorKind::Storage => ExternalService::Storage,
            ExternalErrorKind::Submission
            | ExternalErrorKind::MalformedResponse
            | ExternalErrorKind::RateLimited => ExternalService::Asr,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Domain Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Domain Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl Error {
    /// Human readable detail of what went wrong, taken from `source` when present.
    pub fn detail(&self) -> String {
        match (&self.source, &self.error_kind) {
            (Some(source), _) => source.to_string(),
            (None, DomainErrorKind::Internal(InternalErrorKind::Invalid(msg)))
            | (None, DomainErrorKind::Internal(InternalErrorKind::Other(msg)))
            | (None, DomainErrorKind::External(ExternalErrorKind::Other(_, msg))) => msg.clone(),
            (None, kind) => format!("{kind:?}"),
        }
    }
}

// Only building a reqwest::Client goes through `?`. Failures of actual calls are
// wrapped with `network_error` so they name the service that was called.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to build reqwest client".to_string(),
            )),
        }
    }
}

/// Helper function to create configuration errors.
pub fn config_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
    }
}

/// Helper function to create invalid input errors.
pub fn invalid_error(message: &str) -> Error {
    Error {
        source: None,
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Invalid(message.to_string())),
    }
}

/// Helper function to create external errors carrying a diagnostic message.
pub fn external_error(kind: ExternalErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: DomainErrorKind::External(kind),
    }
}

/// Helper function to wrap a transport failure against `service`.
pub fn network_error<E>(service: ExternalService, err: E) -> Error
where
    E: StdError + Send + Sync + 'static,
{
    Error {
        source: Some(Box::new(err)),
        error_kind: DomainErrorKind::External(ExternalErrorKind::Network(service)),
    }
}
