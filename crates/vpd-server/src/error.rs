use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use vpd_core::error::VpdError;

use crate::device::DeviceError;

// ---------------------------------------------------------------------------
// ControlError: why the control loop stopped
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("fatal device error during {what}: {source}")]
    Device {
        what: String,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Core(#[from] VpdError),
}

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 404 errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(n) = self.0.downcast_ref::<NotFoundError>() {
            let body = serde_json::json!({ "error": n.0.clone() });
            return (StatusCode::NOT_FOUND, axum::Json(body)).into_response();
        }
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<VpdError>() {
            match e {
                VpdError::UnknownStage(_)
                | VpdError::StageNotConfigured(_)
                | VpdError::UnknownActuator(_) => StatusCode::NOT_FOUND,
                VpdError::UnknownAction(_) | VpdError::InvalidStageConfig { .. } => {
                    StatusCode::BAD_REQUEST
                }
                VpdError::OverrideConflict(_) => StatusCode::CONFLICT,
                VpdError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
                VpdError::PolicyTable(_)
                | VpdError::Io(_)
                | VpdError::Yaml(_)
                | VpdError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
