use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: title and/or timestamp";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing_fields")]
    MissingFields,
    #[error("validation")]
    JsonValidation(#[from] JsonRejection),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ErrorResponse {
    Validation { message: String },
    Unexpected { message: String },
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            // plain text, as callers of the function expect
            Error::MissingFields => {
                tracing::error!("Missing required fields");
                (StatusCode::BAD_REQUEST, MISSING_FIELDS_MESSAGE).into_response()
            }
            Error::JsonValidation(rejection) => (
                rejection.status(),
                axum::Json(ErrorResponse::Validation {
                    message: rejection.body_text(),
                }),
            )
                .into_response(),
            Error::Io(error) => {
                tracing::error!("{error:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(ErrorResponse::Unexpected {
                        message: "Unexpected error".into(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
