use std::sync::{Arc, OnceLock};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not_found")]
    NotFound(String),

    // auth
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,

    // validation
    #[error("validation")]
    Validation(String),
    #[error("validation")]
    JsonValidation(#[from] JsonRejection),
    #[error("validation")]
    PathValidation(#[from] PathRejection),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct ErrorResponse {
    pub error: String,
    pub message: Option<String>,
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, status: u16) -> Self {
        Self {
            error: error.into(),
            status,
            ..Default::default()
        }
    }

    pub fn with_message(&self, message: impl Into<String>) -> Self {
        let mut res = self.clone();
        res.message = Some(message.into());
        res
    }
}

/// Static table of error bodies, one per code
/// ```rust
/// error_responses! {
///     not_found: 404,
///     unexpected: 500
/// }
/// ```
macro_rules! error_responses {
    (
        $($name:ident: $code:expr),* $(,)?
    ) => {
        #[derive(Debug, Clone, Serialize)]
        struct Responses {
            $(
                $name: ErrorResponse,
            )*
        }

        static ERRORS: OnceLock<Responses> = OnceLock::new();

        fn errors() -> &'static Responses {
            ERRORS.get_or_init(|| Responses {
                $(
                    $name: ErrorResponse::new(stringify!($name), $code),
                )*
            })
        }
    };
}

error_responses! {
    not_found: 404,
    validation: 400,
    unauthorized: 401,
    forbidden: 403,
    unexpected: 500
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        let errors = errors();
        match error {
            Error::NotFound(message) => errors.not_found.with_message(message),
            Error::Unauthorized => errors.unauthorized.with_message("Missing x-user-id header"),
            Error::Forbidden => errors.forbidden.with_message("Only the owner can modify this note"),
            Error::Validation(message) => errors.validation.with_message(message),
            Error::JsonValidation(rejection) => errors.validation.with_message(rejection.body_text()),
            Error::PathValidation(rejection) => errors.validation.with_message(rejection.body_text()),
            Error::Io(_) => errors.unexpected.with_message("Unexpected"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let error = Arc::new(self);

        let error_res = ErrorResponse::from(error.as_ref());
        let status = error_res.status;

        let mut res = axum::Json(error_res).into_response();
        res.extensions_mut().insert(error);

        *res.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        res
    }
}

pub async fn on_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let error = response.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    if let Some(error) = error {
        if response.status().is_server_error() {
            tracing::error!("{:?}", error);
        } else {
            tracing::debug!("{:?}", error);
        }
    }

    response
}
