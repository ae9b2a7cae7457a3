use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use domain::error::{DomainErrorKind, Error as DomainError, ExternalErrorKind, InternalErrorKind};

use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status_code: u16,
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'static str>,
    message: String,
}

impl Error {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match &self.0.error_kind {
            DomainErrorKind::Internal(internal_error_kind) => match internal_error_kind {
                InternalErrorKind::Invalid(message) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorDetail {
                        service: None,
                        message: message.clone(),
                    },
                ),
                InternalErrorKind::Config | InternalErrorKind::Other(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail {
                        service: None,
                        message: "INTERNAL SERVER ERROR".to_string(),
                    },
                ),
            },
            DomainErrorKind::External(external_error_kind) => {
                let status = match external_error_kind {
                    ExternalErrorKind::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    ErrorDetail {
                        service: Some(external_error_kind.service().name()),
                        message: self.0.detail(),
                    },
                )
            }
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            error!("Request failed with {status}: {}", self.0);
        } else {
            warn!("Request rejected with {status}: {}", detail.message);
        }

        let body = ErrorBody {
            status_code: status.as_u16(),
            error: detail,
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
