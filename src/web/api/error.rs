use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::protocol::ProtocolError;
use crate::tracker::TrackingError;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal(&'static str, String),
}

impl From<ProtocolError> for ApiError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::PassNotFound(_) => ApiError::NotFound("pass_not_found"),
            ProtocolError::EmptyPass(_) => ApiError::Conflict("pass_has_no_samples"),
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::PassNotFound(_) => ApiError::NotFound("pass_not_found"),
            TrackingError::EmptyPass(_) => ApiError::Conflict("pass_has_no_samples"),
            TrackingError::NoActivePass => ApiError::Conflict("no_active_pass"),
            TrackingError::EmptyQueue => {
                ApiError::Validation("no known upcoming passes in request".into())
            }
            TrackingError::Protocol(e) => e.into(),
            TrackingError::Link(e) => ApiError::Internal("link_error", e.to_string()),
            TrackingError::ControlLoopClosed => {
                ApiError::Internal("control_loop_closed", e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_message("validation_failed", &msg)),
            )
                .into_response(),
            ApiError::NotFound(reason) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new(reason))).into_response()
            }
            ApiError::Conflict(reason) => {
                (StatusCode::CONFLICT, Json(ErrorResponse::new(reason))).into_response()
            }
            ApiError::Internal(reason, msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_message(reason, &msg)),
            )
                .into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}
