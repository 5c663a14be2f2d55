use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::identity::IdentityError;

pub type AppResult<T> = Result<T, AppError>;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures raised by the document, profile and notification services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid status `{0}`: expected `verified` or `rejected`")]
    InvalidStatus(String),
    #[error("could not find college for this student")]
    ProfileIncomplete,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{context}: {source:#}")]
    Upstream {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn upstream(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Upstream { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidStatus(_) | Self::ProfileIncomplete | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        let status = value.status();
        if status.is_server_error() {
            tracing::error!(error = %value, "upstream call failed");
        }
        AppError::new(status, value.to_string())
    }
}

impl From<IdentityError> for AppError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Invalid(_) => AppError::unauthorized(),
            IdentityError::Upstream(err) => {
                tracing::error!(error = %err, "identity provider unavailable");
                AppError::new(StatusCode::BAD_GATEWAY, "identity provider unavailable")
            }
        }
    }
}

/// Malformed or mistyped JSON bodies are client errors, reported in the usual `{error}` shape.
impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::bad_request(value.body_text())
    }
}
