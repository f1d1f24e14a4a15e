use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use broker::DiscoveryError;
use broker_core::FailureKind;
use serde_json::json;
use thiserror::Error;
use tooling::RegistryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl ApiError {
    /// Failure kind reported alongside the message, if the error has one.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ApiError::ValidationError(_) => None,
            ApiError::Registry(error) => Some(error.kind()),
            ApiError::Discovery(error) => Some(error.kind()),
        }
    }

    /// Returns the appropriate HTTP status code for this error
    pub fn http_status_code(&self) -> u16 {
        match self.failure_kind() {
            None => 400,
            Some(FailureKind::DuplicateId) => 409,
            Some(FailureKind::NotFound | FailureKind::UnknownToolGroup) => 404,
            Some(FailureKind::Timeout) => 504,
            Some(_) => 502,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match self.failure_kind() {
            Some(kind) => json!({ "error": self.to_string(), "kind": kind }),
            None => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
