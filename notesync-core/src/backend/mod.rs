//! Transport seam between the store and the managed backend.

mod memory;
mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::{
    notes::{CreateNote, Note, NoteId, UpdateNote, UserId},
    Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: User,
}

#[async_trait]
pub trait NotesApi: Send + Sync {
    /// The whole community feed, newest first.
    async fn get_all(&self, session: Option<&Session>) -> Result<Vec<Note>>;

    async fn get_user_notes(&self, session: &Session) -> Result<Vec<Note>>;

    async fn create(&self, session: &Session, note: CreateNote) -> Result<Note>;

    async fn update(&self, session: &Session, id: NoteId, note: UpdateNote) -> Result<Note>;

    async fn delete(&self, session: &Session, id: NoteId) -> Result<()>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_up(&self, username: &str, password: &str) -> Result<()>;

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self, session: &Session) -> Result<()>;

    async fn get_user(&self, session: &Session) -> Result<User>;

    /// Trades a refresh token for a new session. The old refresh token is spent.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;
}

pub trait Backend: NotesApi + AuthApi {}

impl<T> Backend for T where T: NotesApi + AuthApi {}

/// Accounts are keyed by a synthetic email built from the lowercased username.
pub fn email_for(username: &str, domain: &str) -> String {
    format!("{}@{domain}", username.trim().to_lowercase())
}
