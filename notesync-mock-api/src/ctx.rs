use axum::{
    extract::{Extension, FromRequestParts},
    http::request::Parts,
};
use notesync_core::notes::UserId;
use uuid::Uuid;

use crate::{state::NoteRepo, Error, Result};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";

#[derive(Clone, FromRequestParts)]
pub struct BaseParams {
    pub ctx: Ctx,
    #[from_request(via(Extension))]
    pub notes: NoteRepo,
}

impl BaseParams {
    pub fn new(notes: NoteRepo, ctx: Ctx) -> Self {
        Self { ctx, notes }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: UserId,
    pub username: String,
}

/// The mock trusts identity headers instead of verifying tokens.
#[derive(Clone, Debug, Default)]
pub struct Ctx {
    pub user: Option<Caller>,
}

impl Ctx {
    pub fn new(user: Option<Caller>) -> Self {
        Self { user }
    }

    pub fn require_user(&self) -> Result<&Caller> {
        self.user.as_ref().ok_or(Error::Unauthorized)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Some(raw_id) = header(parts, USER_ID_HEADER) else {
            return Ok(Self::new(None));
        };

        let id = Uuid::parse_str(raw_id).map_err(|_| Error::Validation(format!("Invalid {USER_ID_HEADER} header")))?;
        let username = header(parts, USERNAME_HEADER).unwrap_or("anonymous").to_lowercase();

        Ok(Self::new(Some(Caller { id, username })))
    }
}
