pub type Result<T> = std::result::Result<T, Error>;

pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Codes meaning the credentials themselves were refused. `401`/`403` stand in
/// when the backend answered with a bare status.
const AUTH_REJECTION_CODES: &[&str] = &[
    "bad_jwt",
    "session_not_found",
    "session_expired",
    "user_not_found",
    "refresh_token_not_found",
    "refresh_token_already_used",
    "PGRST301",
    "401",
    "403",
];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // validation
    #[error("title_required")]
    TitleRequired,

    // auth
    #[error("not_authenticated")]
    NotAuthenticated,

    /// Uniform error raised by the note transport when the backend rejects a call.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] envy::Error),
}

impl Error {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::api(UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_MESSAGE)
    }

    /// Machine readable code, shared by every variant.
    pub fn code(&self) -> &str {
        match self {
            Error::TitleRequired => "TITLE_REQUIRED",
            Error::NotAuthenticated => "NOT_AUTHENTICATED",
            Error::Api { code, .. } => code,
            Error::Http(_) => "NETWORK_ERROR",
            Error::Json(_) => "INVALID_RESPONSE",
            Error::Config(_) => "INVALID_CONFIG",
        }
    }

    /// True when the session is no longer accepted, as opposed to the call failing.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Error::Api { code, .. } if AUTH_REJECTION_CODES.contains(&code.as_str()))
    }
}
