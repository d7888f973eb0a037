use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::Error;

#[derive(Serialize, Debug)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (status, Json(ErrorBody { code, message })).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(what) => {
                error_response(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }

            Self::LimitExceeded(e) => error_response(StatusCode::FORBIDDEN, e.code(), e.to_string()),

            Self::Validation(message) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }

            Self::Transient(e) => {
                error!("Error occured while processing an HTTP request: {e:#}");

                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".into(),
                )
            }
        }
    }
}

/// The request carries no user id.
#[derive(Debug, Clone, Copy)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "the request is not authenticated".into(),
        )
    }
}
