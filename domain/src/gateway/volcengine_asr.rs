//! Volcengine "bigmodel" ASR API client for asynchronous transcription tasks.
//!
//! The service exposes two POST endpoints: `submit` to start a task for an audio
//! URL and `query` to poll it. Requests are correlated by a client chosen request
//! id, and outcomes are signaled through the `X-Api-Status-Code` response header
//! rather than the HTTP status or body.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use service::config::Config;

use crate::error::{
    config_error, external_error, invalid_error, network_error, Error, ExternalErrorKind,
    ExternalService,
};
use crate::rate_limit::{Quota, Throttle};
use crate::task_status::RemoteStatusCode;

pub const HEADER_APP_KEY: &str = "X-Api-App-Key";
pub const HEADER_ACCESS_KEY: &str = "X-Api-Access-Key";
pub const HEADER_RESOURCE_ID: &str = "X-Api-Resource-Id";
pub const HEADER_REQUEST_ID: &str = "X-Api-Request-Id";
pub const HEADER_SEQUENCE: &str = "X-Api-Sequence";
pub const HEADER_STATUS_CODE: &str = "X-Api-Status-Code";
pub const HEADER_MESSAGE: &str = "X-Api-Message";
pub const HEADER_LOG_ID: &str = "X-Tt-Logid";

/// Credentials identifying this application to the ASR service.
#[derive(Debug)]
pub struct AsrCredentials {
    pub app_key: String,
    pub access_key: SecretString,
    pub resource_id: String,
}

/// Request body for submitting a transcription task
#[derive(Debug, Serialize)]
pub struct SubmitTaskRequest {
    pub user: SubmitUser,
    pub audio: SubmitAudio,
    pub request: SubmitOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitUser {
    pub uid: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAudio {
    pub format: String,
    pub url: String,
    pub show_utterances: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitOptions {
    pub model_name: String,
    pub enable_itn: bool,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub task_id: String,
    pub log_id: Option<String>,
}

/// Raw, uninterpreted result of a query call.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Value of `X-Api-Status-Code`, if the header was present and readable.
    pub status_code: Option<String>,
    pub message: Option<String>,
    pub log_id: Option<String>,
    /// All response headers rendered for diagnostics.
    pub headers: String,
    pub body: String,
}

/// Volcengine ASR API client
pub struct AsrClient {
    client: reqwest::Client,
    submit_url: String,
    query_url: String,
    credentials: AsrCredentials,
    model_name: String,
    audio_format: String,
    cluster: Option<String>,
    throttle: Arc<dyn Throttle>,
    quota: Quota,
}

impl AsrClient {
    /// Create a new ASR client from the application config, sharing `throttle`
    /// with every other user of the same credentials.
    pub fn new(config: &Config, throttle: Arc<dyn Throttle>) -> Result<Self, Error> {
        let app_key = config.asr_app_id().ok_or_else(|| {
            warn!("Failed to get ASR app id from config");
            config_error("AUC_APP_ID is not configured")
        })?;
        let access_key = config.asr_access_token().ok_or_else(|| {
            warn!("Failed to get ASR access token from config");
            config_error("AUC_ACCESS_TOKEN is not configured")
        })?;

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.asr_request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            submit_url: config.asr_submit_url().to_string(),
            query_url: config.asr_query_url().to_string(),
            credentials: AsrCredentials {
                app_key,
                access_key: SecretString::new(access_key),
                resource_id: config.asr_resource_id().to_string(),
            },
            model_name: config.asr_model_name().to_string(),
            audio_format: config.asr_audio_format().to_string(),
            cluster: config.asr_cluster_id().filter(|c| !c.is_empty()),
            throttle,
            quota: Quota::per_second(config.asr_rate_limit, config.asr_rate_burst),
        })
    }

    /// The application key, which also scopes rate limiting.
    pub fn app_key(&self) -> &str {
        &self.credentials.app_key
    }

    /// Submit a transcription task for `audio_url`, identified by the caller chosen `task_id`.
    ///
    /// The task is accepted only when the response carries the success status code;
    /// anything else is returned as a `Submission` error with the response headers.
    pub async fn submit(&self, audio_url: &str, task_id: &str) -> Result<SubmitOutcome, Error> {
        let body = SubmitTaskRequest {
            user: SubmitUser {
                uid: self.credentials.app_key.clone(),
            },
            audio: SubmitAudio {
                format: self.audio_format.clone(),
                url: audio_url.to_string(),
                show_utterances: true,
            },
            request: SubmitOptions {
                model_name: self.model_name.clone(),
                enable_itn: true,
            },
            cluster: self.cluster.clone(),
        };

        let mut headers = self.credential_headers(task_id)?;
        headers.insert(HEADER_SEQUENCE, HeaderValue::from_static("-1"));

        self.throttle
            .acquire(&self.credentials.app_key, self.quota)
            .await?;

        debug!("Submitting ASR task {task_id} for audio: {audio_url}");

        let response = self
            .client
            .post(&self.submit_url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to submit ASR task {task_id}: {e:?}");
                network_error(ExternalService::Asr, e)
            })?;

        let response_headers = response.headers();
        let status_code = header_str(response_headers, HEADER_STATUS_CODE);
        let log_id = header_str(response_headers, HEADER_LOG_ID);

        if status_code.as_deref() == Some(RemoteStatusCode::SUCCESS) {
            info!("Submitted ASR task {task_id}, log id: {log_id:?}");
            Ok(SubmitOutcome {
                task_id: task_id.to_string(),
                log_id,
            })
        } else {
            let rendered = render_headers(response_headers);
            error!(
                "ASR service rejected task {task_id} with status {status_code:?}, log id: {log_id:?}"
            );
            Err(external_error(
                ExternalErrorKind::Submission,
                &format!("Submit task failed and the response headers are: {rendered}"),
            ))
        }
    }

    /// Query the state of a previously submitted task.
    ///
    /// The returned outcome is uninterpreted; see [`crate::task_status::translate`].
    pub async fn query(&self, task_id: &str) -> Result<QueryOutcome, Error> {
        let headers = self.credential_headers(task_id)?;

        self.throttle
            .acquire(&self.credentials.app_key, self.quota)
            .await?;

        debug!("Querying ASR task {task_id}");

        let response = self
            .client
            .post(&self.query_url)
            .headers(headers)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to query ASR task {task_id}: {e:?}");
                network_error(ExternalService::Asr, e)
            })?;

        let response_headers = response.headers();
        let status_code = header_str(response_headers, HEADER_STATUS_CODE);
        let message = header_str(response_headers, HEADER_MESSAGE);
        let log_id = header_str(response_headers, HEADER_LOG_ID);
        let rendered = render_headers(response_headers);

        let body = response.text().await.map_err(|e| {
            warn!("Failed to read ASR query body for task {task_id}: {e:?}");
            network_error(ExternalService::Asr, e)
        })?;

        Ok(QueryOutcome {
            status_code,
            message,
            log_id,
            headers: rendered,
            body,
        })
    }

    fn credential_headers(&self, task_id: &str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_APP_KEY,
            header_value(&self.credentials.app_key, "app key")?,
        );

        let mut access_key =
            header_value(self.credentials.access_key.expose_secret(), "access key")?;
        access_key.set_sensitive(true);
        headers.insert(HEADER_ACCESS_KEY, access_key);

        headers.insert(
            HEADER_RESOURCE_ID,
            header_value(&self.credentials.resource_id, "resource id")?,
        );
        headers.insert(
            HEADER_REQUEST_ID,
            HeaderValue::from_str(task_id)
                .map_err(|_| invalid_error("Task id contains characters not allowed in a header"))?,
        );
        Ok(headers)
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|err| {
        warn!("Failed to create ASR {what} header value: {err:?}");
        config_error(&format!("Invalid ASR {what}"))
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Renders response headers as `name: value` pairs, hiding sensitive values.
fn render_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if value.is_sensitive() {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<non-ascii>")
            };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainErrorKind;
    use crate::rate_limit::TokenBucketLimiter;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    const SUBMIT_PATH: &str = "/api/v3/auc/bigmodel/submit";
    const QUERY_PATH: &str = "/api/v3/auc/bigmodel/query";

    fn test_config(server: &ServerGuard) -> Config {
        Config::from_env()
            .set_asr_base_url(&server.url())
            .set_asr_credentials("app-123", "secret-token")
    }

    fn test_client(server: &ServerGuard) -> AsrClient {
        AsrClient::new(&test_config(server), Arc::new(TokenBucketLimiter::new())).unwrap()
    }

    #[test]
    fn test_client_creation_fails_without_credentials() {
        let config = Config::from_env().clear_asr_credentials();
        let result = AsrClient::new(&config, Arc::new(TokenBucketLimiter::new()));

        assert!(matches!(
            result.map(|_| ()).unwrap_err().error_kind,
            DomainErrorKind::Internal(crate::error::InternalErrorKind::Config)
        ));
    }

    #[tokio::test]
    async fn test_app_key_scopes_the_client() {
        let server = Server::new_async().await;
        assert_eq!(test_client(&server).app_key(), "app-123");
    }

    #[test]
    fn test_submit_request_serialization() {
        let request = SubmitTaskRequest {
            user: SubmitUser {
                uid: "app-123".to_string(),
            },
            audio: SubmitAudio {
                format: "mp3".to_string(),
                url: "https://store/a.mp3?sig=abc".to_string(),
                show_utterances: true,
            },
            request: SubmitOptions {
                model_name: "bigmodel".to_string(),
                enable_itn: true,
            },
            cluster: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "user": {"uid": "app-123"},
                "audio": {"format": "mp3", "url": "https://store/a.mp3?sig=abc", "show_utterances": true},
                "request": {"model_name": "bigmodel", "enable_itn": true}
            })
        );
    }

    #[tokio::test]
    async fn test_submit_sends_credentials_and_task_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", SUBMIT_PATH)
            .match_header("x-api-app-key", "app-123")
            .match_header("x-api-access-key", "secret-token")
            .match_header("x-api-resource-id", "volc.bigasr.auc")
            .match_header("x-api-request-id", "task-1")
            .match_header("x-api-sequence", "-1")
            .match_body(Matcher::PartialJson(json!({
                "audio": {"format": "mp3", "url": "https://store/a.mp3", "show_utterances": true},
                "request": {"model_name": "bigmodel", "enable_itn": true}
            })))
            .with_status(200)
            .with_header("X-Api-Status-Code", "20000000")
            .with_header("X-Api-Message", "OK")
            .with_header("X-Tt-Logid", "log-abc")
            .create_async()
            .await;

        let outcome = test_client(&server)
            .submit("https://store/a.mp3", "task-1")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            outcome,
            SubmitOutcome {
                task_id: "task-1".to_string(),
                log_id: Some("log-abc".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_submit_rejected_status_is_submission_error_with_headers() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", SUBMIT_PATH)
            .with_status(200)
            .with_header("X-Api-Status-Code", "45000001")
            .with_header("X-Api-Message", "invalid params")
            .create_async()
            .await;

        let err = test_client(&server)
            .submit("https://store/a.mp3", "task-1")
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Submission)
        );
        assert!(err.detail().contains("45000001"));
        assert!(err.detail().contains("invalid params"));
    }

    #[tokio::test]
    async fn test_submit_without_status_header_is_submission_error() {
        let mut server = Server::new_async().await;
        // a successful HTTP status is not enough
        let _mock = server
            .mock("POST", SUBMIT_PATH)
            .with_status(200)
            .create_async()
            .await;

        let err = test_client(&server)
            .submit("https://store/a.mp3", "task-1")
            .await
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Submission)
        );
    }

    #[tokio::test]
    async fn test_submit_success_sentinel_wins_over_http_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", SUBMIT_PATH)
            .with_status(202)
            .with_header("X-Api-Status-Code", "20000000")
            .create_async()
            .await;

        let result = test_client(&server)
            .submit("https://store/a.mp3", "task-1")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_query_omits_sequence_and_returns_raw_outcome() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", QUERY_PATH)
            .match_header("x-api-request-id", "task-1")
            .match_header("x-api-app-key", "app-123")
            .match_header("x-api-sequence", Matcher::Missing)
            .match_body(Matcher::Json(json!({})))
            .with_status(200)
            .with_header("X-Api-Status-Code", "20000001")
            .with_header("X-Api-Message", "Processing")
            .with_header("X-Tt-Logid", "log-q")
            .with_body("{}")
            .create_async()
            .await;

        let outcome = test_client(&server).query("task-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome.status_code.as_deref(), Some("20000001"));
        assert_eq!(outcome.message.as_deref(), Some("Processing"));
        assert_eq!(outcome.log_id.as_deref(), Some("log-q"));
        assert!(outcome.headers.contains("x-tt-logid: log-q"));
        assert_eq!(outcome.body, "{}");
    }

    #[tokio::test]
    async fn test_query_without_status_header_reports_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", QUERY_PATH)
            .with_status(500)
            .create_async()
            .await;

        let outcome = test_client(&server).query("task-1").await.unwrap();
        assert_eq!(outcome.status_code, None);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = Config::from_env()
            .set_asr_base_url("http://127.0.0.1:1")
            .set_asr_credentials("app-123", "secret-token");
        let client = AsrClient::new(&config, Arc::new(TokenBucketLimiter::new())).unwrap();

        let err = client.query("task-1").await.unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Network(ExternalService::Asr))
        );
    }

    #[tokio::test]
    async fn test_task_id_with_invalid_header_characters_is_rejected() {
        let server = Server::new_async().await;
        let err = test_client(&server).query("bad\nid").await.unwrap_err();
        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(crate::error::InternalErrorKind::Invalid(_))
        ));
    }
}
