use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{email_for, AuthApi, NotesApi, Session, User};
use crate::{
    notes::{normalize_title, sort_newest_first, CreateNote, Note, NoteId, UpdateNote, UserId},
    Error, Result,
};

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, UserId>,
    refresh_tokens: HashMap<String, UserId>,
    notes: Vec<Note>,
    failure: Option<(String, String)>,
}

/// In-process backend with the same observable behaviour as the hosted one:
/// synthetic-email accounts, bearer tokens, and owner-only writes.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    email_domain: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("notesync.com")
    }
}

impl MemoryBackend {
    pub fn new(email_domain: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            email_domain: email_domain.into(),
        }
    }

    /// While offline every call fails as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.set_failure(offline.then_some(("NETWORK_ERROR", "Backend unreachable")));
    }

    /// Every call fails with this code until cleared.
    pub fn set_failure(&self, failure: Option<(&str, &str)>) {
        self.state.lock().failure = failure.map(|(code, message)| (code.to_owned(), message.to_owned()));
    }

    /// Invalidates every issued access token; refresh tokens stay usable.
    pub fn expire_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    pub fn insert_note(&self, note: Note) {
        self.state.lock().notes.push(note);
    }

    pub fn notes(&self) -> Vec<Note> {
        self.state.lock().notes.clone()
    }
}

impl MemoryState {
    fn ensure_online(&self) -> Result<()> {
        match &self.failure {
            Some((code, message)) => Err(Error::api(code.clone(), message.clone())),
            None => Ok(()),
        }
    }

    fn issue_session(&mut self, user: User) -> Session {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        self.tokens.insert(access_token.clone(), user.id);
        self.refresh_tokens.insert(refresh_token.clone(), user.id);
        Session {
            access_token,
            refresh_token: Some(refresh_token),
            user,
        }
    }

    fn user(&self, user_id: UserId) -> Result<User> {
        self.accounts
            .values()
            .map(|a| &a.user)
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| Error::api("user_not_found", "User not found"))
    }

    fn authorize(&self, session: &Session) -> Result<UserId> {
        self.ensure_online()?;
        self.tokens
            .get(&session.access_token)
            .copied()
            .ok_or_else(|| Error::api("bad_jwt", "Invalid JWT"))
    }

    fn owned_note_mut(&mut self, user_id: UserId, id: NoteId) -> Result<&mut Note> {
        self.notes
            .iter_mut()
            .find(|n| n.id == id && n.is_owned_by(Some(user_id)))
            .ok_or_else(|| Error::api("NOT_FOUND", "Note not found"))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl NotesApi for MemoryBackend {
    async fn get_all(&self, session: Option<&Session>) -> Result<Vec<Note>> {
        let state = self.state.lock();
        match session {
            Some(session) => state.authorize(session).map(|_| ())?,
            None => state.ensure_online()?,
        }
        let mut notes = state.notes.clone();
        sort_newest_first(&mut notes);
        Ok(notes)
    }

    async fn get_user_notes(&self, session: &Session) -> Result<Vec<Note>> {
        let state = self.state.lock();
        let user_id = state.authorize(session)?;
        let mut notes: Vec<Note> = state
            .notes
            .iter()
            .filter(|n| n.is_owned_by(Some(user_id)))
            .cloned()
            .collect();
        sort_newest_first(&mut notes);
        Ok(notes)
    }

    async fn create(&self, session: &Session, CreateNote { title, content }: CreateNote) -> Result<Note> {
        let title = normalize_title(&title).ok_or(Error::TitleRequired)?;

        let mut state = self.state.lock();
        let user_id = state.authorize(session)?;
        let note = Note {
            id: Uuid::now_v7(),
            user_id: Some(user_id),
            username: session.user.username.clone().unwrap_or_default(),
            title,
            content,
            timestamp: now(),
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    async fn update(&self, session: &Session, id: NoteId, UpdateNote { title, content }: UpdateNote) -> Result<Note> {
        let title = normalize_title(&title).ok_or(Error::TitleRequired)?;

        let mut state = self.state.lock();
        let user_id = state.authorize(session)?;
        let note = state.owned_note_mut(user_id, id)?;
        note.title = title;
        note.content = content;
        Ok(note.clone())
    }

    async fn delete(&self, session: &Session, id: NoteId) -> Result<()> {
        let mut state = self.state.lock();
        let user_id = state.authorize(session)?;
        state.owned_note_mut(user_id, id)?;
        state.notes.retain(|n| n.id != id);
        Ok(())
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_up(&self, username: &str, password: &str) -> Result<()> {
        let email = email_for(username, &self.email_domain);
        let mut state = self.state.lock();
        state.ensure_online()?;
        if state.accounts.contains_key(&email) {
            return Err(Error::api("user_already_exists", "User already registered"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.clone()),
            username: Some(username.trim().to_lowercase()),
        };
        state.accounts.insert(
            email,
            Account {
                user,
                password: password.to_owned(),
            },
        );
        Ok(())
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let email = email_for(username, &self.email_domain);
        let mut state = self.state.lock();
        state.ensure_online()?;

        let user = match state.accounts.get(&email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(Error::api("invalid_credentials", "Invalid login credentials")),
        };

        Ok(state.issue_session(user))
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock();
        state.authorize(session)?;
        state.tokens.remove(&session.access_token);
        if let Some(refresh_token) = &session.refresh_token {
            state.refresh_tokens.remove(refresh_token);
        }
        Ok(())
    }

    async fn get_user(&self, session: &Session) -> Result<User> {
        let state = self.state.lock();
        let user_id = state.authorize(session)?;
        state.user(user_id)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let mut state = self.state.lock();
        state.ensure_online()?;

        let user_id = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| Error::api("refresh_token_not_found", "Invalid Refresh Token: Refresh Token Not Found"))?;
        let user = state.user(user_id)?;
        Ok(state.issue_session(user))
    }
}
