//! Owned state container behind every consumer: feed, own notes, notifications.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    audit::AuditNotifier,
    backend::{Backend, RestBackend, Session},
    notes::{normalize_title, CreateNote, Note, NoteId, UpdateNote, UserId},
    notifications::{
        check_for_new_notifications, has_unread, initial_last_checked, mark_all_notifications_read, unread_count,
        Notification,
    },
    Config, Error, Result,
};

#[derive(Debug, Clone)]
struct StoreState {
    session: Option<Session>,
    notes: Vec<Note>,
    user_notes: Vec<Note>,
    notifications: Vec<Notification>,
    last_checked: DateTime<Utc>,
    /// Ticket of the feed snapshot currently in `notes`.
    feed_fetch: u64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            session: None,
            notes: Vec::new(),
            user_notes: Vec::new(),
            notifications: Vec::new(),
            last_checked: initial_last_checked(),
            feed_fetch: 0,
        }
    }
}

impl StoreState {
    fn for_session(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Default::default()
        }
    }

    fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(|s| s.user.id)
    }

    /// Fetches are ticketed in start order; a snapshot older than the one in place is refused.
    fn accept_feed(&mut self, ticket: u64) -> bool {
        if ticket < self.feed_fetch {
            return false;
        }
        self.feed_fetch = ticket;
        true
    }
}

/// Decrements the in-flight counter however the operation ends.
struct Loading<'a>(&'a AtomicUsize);

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct NotesStore {
    backend: Arc<dyn Backend>,
    audit: Option<AuditNotifier>,
    state: RwLock<StoreState>,
    in_flight: AtomicUsize,
    fetch_seq: AtomicU64,
    refreshing: Mutex<()>,
}

impl NotesStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            audit: None,
            state: RwLock::new(StoreState::default()),
            in_flight: AtomicUsize::new(0),
            fetch_seq: AtomicU64::new(0),
            refreshing: Mutex::new(()),
        }
    }

    pub fn with_audit(mut self, audit: AuditNotifier) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Self::new(Arc::new(RestBackend::new(config)?));

        match &config.audit_url {
            Some(url) => Ok(store.with_audit(AuditNotifier::new(url)?)),
            None => Ok(store),
        }
    }

    fn start_loading(&self) -> Loading<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Loading(&self.in_flight)
    }

    fn next_fetch(&self) -> u64 {
        self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    // auth

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<()> {
        let _loading = self.start_loading();
        self.backend.sign_up(username, password).await?;
        info!(username = %username.trim().to_lowercase(), "registered");
        Ok(())
    }

    /// Starts a fresh session: notifications and the high-water mark start over.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let _loading = self.start_loading();
        let session = self.backend.sign_in(username, password).await?;
        *self.state.write().await = StoreState::for_session(session.clone());
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    /// Adopts a previously persisted session after checking it is still valid.
    /// An expired access token is traded in through the refresh token.
    pub async fn restore_session(&self, session: Session) -> Result<Session> {
        let _loading = self.start_loading();
        let checked = self.backend.get_user(&session).await;
        let session = match checked {
            Ok(user) => Session { user, ..session },
            Err(e) if e.is_auth_rejection() => match session.refresh_token.as_deref() {
                Some(refresh_token) => {
                    debug!(code = e.code(), "stored access token rejected, refreshing");
                    self.backend.refresh_session(refresh_token).await?
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        *self.state.write().await = StoreState::for_session(session.clone());
        debug!(user_id = %session.user.id, "session restored");
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<()> {
        let session = self.require_session().await?;
        let _loading = self.start_loading();
        self.authorized(session.clone(), |backend, session| async move { backend.sign_out(&session).await })
            .await?;
        *self.state.write().await = StoreState::default();
        info!(user_id = %session.user.id, "signed out");
        Ok(())
    }

    /// The live session, including any token rotation since sign-in.
    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn current_user_id(&self) -> Option<UserId> {
        self.state.read().await.user_id()
    }

    async fn require_session(&self) -> Result<Session> {
        self.session().await.ok_or(Error::NotAuthenticated)
    }

    /// Swaps a rejected session for a refreshed one. `None` when there is no
    /// refresh token or the viewer changed meanwhile.
    async fn refresh(&self, stale: &Session) -> Result<Option<Session>> {
        let _refreshing = self.refreshing.lock().await;

        match self.session().await {
            Some(current) if current.user.id != stale.user.id => return Ok(None),
            // rotated by a concurrent call
            Some(current) if current.access_token != stale.access_token => return Ok(Some(current)),
            Some(_) => {}
            None => return Ok(None),
        }
        let Some(refresh_token) = stale.refresh_token.as_deref() else {
            return Ok(None);
        };

        let session = self.backend.refresh_session(refresh_token).await?;
        let mut state = self.state.write().await;
        if state.user_id() != Some(session.user.id) {
            return Ok(None);
        }
        state.session = Some(session.clone());
        info!(user_id = %session.user.id, "session refreshed");
        Ok(Some(session))
    }

    /// Runs `call` with `session`, refreshing and retrying once if the token is refused.
    async fn authorized<T, F, Fut>(&self, session: Session, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>, Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let rejected = match call(self.backend.clone(), session.clone()).await {
            Err(e) if e.is_auth_rejection() => e,
            other => return other,
        };

        match self.refresh(&session).await? {
            Some(fresh) => call(self.backend.clone(), fresh).await,
            None => Err(rejected),
        }
    }

    // notes

    pub async fn notes(&self) -> Vec<Note> {
        self.state.read().await.notes.clone()
    }

    pub async fn user_notes(&self) -> Vec<Note> {
        self.state.read().await.user_notes.clone()
    }

    async fn fetch_feed(&self, session: Option<Session>) -> Result<Vec<Note>> {
        match session {
            Some(session) => {
                self.authorized(session, |backend, session| async move { backend.get_all(Some(&session)).await })
                    .await
            }
            None => self.backend.get_all(None).await,
        }
    }

    pub async fn load_notes(&self) -> Result<()> {
        let _loading = self.start_loading();
        let ticket = self.next_fetch();
        let session = self.session().await;
        let user_id = session.as_ref().map(|s| s.user.id);

        let notes = self.fetch_feed(session).await?;

        let mut state = self.state.write().await;
        if state.user_id() == user_id && state.accept_feed(ticket) {
            state.notes = notes;
        }
        Ok(())
    }

    pub async fn load_user_notes(&self) -> Result<()> {
        let session = self.require_session().await?;
        let _loading = self.start_loading();
        let notes = self
            .authorized(session, |backend, session| async move { backend.get_user_notes(&session).await })
            .await?;
        self.state.write().await.user_notes = notes;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        tokio::try_join!(self.load_notes(), self.load_user_notes())?;
        Ok(())
    }

    pub async fn create_note(&self, title: &str, content: &str) -> Result<Note> {
        let title = normalize_title(title).ok_or(Error::TitleRequired)?;
        let session = self.require_session().await?;
        let _loading = self.start_loading();

        let request = CreateNote {
            title,
            content: content.to_owned(),
        };
        let note = self
            .authorized(session, |backend, session| {
                let request = request.clone();
                async move { backend.create(&session, request).await }
            })
            .await?;
        info!(note_id = %note.id, "note created");

        if let Some(audit) = &self.audit {
            audit.note_created(&note);
        }

        self.reload().await?;
        Ok(note)
    }

    pub async fn update_note(&self, id: NoteId, title: &str, content: &str) -> Result<Note> {
        let title = normalize_title(title).ok_or(Error::TitleRequired)?;
        let session = self.require_session().await?;
        let _loading = self.start_loading();

        let request = UpdateNote {
            title,
            content: content.to_owned(),
        };
        let note = self
            .authorized(session, |backend, session| {
                let request = request.clone();
                async move { backend.update(&session, id, request).await }
            })
            .await?;
        info!(note_id = %note.id, "note updated");

        self.reload().await?;
        Ok(note)
    }

    pub async fn delete_note(&self, id: NoteId) -> Result<()> {
        let session = self.require_session().await?;
        let _loading = self.start_loading();

        self.authorized(session, move |backend, session| async move { backend.delete(&session, id).await })
            .await?;
        info!(note_id = %id, "note deleted");

        self.reload().await
    }

    // notifications

    /// Fetches the feed and records unread activity from other users.
    ///
    /// Returns the notifications this check added. A failed fetch is logged and
    /// leaves every piece of state untouched; the next check retries.
    pub async fn check_notifications(&self) -> Vec<Notification> {
        let ticket = self.next_fetch();
        let session = self.session().await;
        let user_id = session.as_ref().map(|s| s.user.id);

        let notes = match self.fetch_feed(session).await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(code = e.code(), "Notification check skipped, fetching notes failed: {}", e);
                return Vec::new();
            }
        };

        self.apply_check(ticket, user_id, notes, Utc::now()).await
    }

    async fn apply_check(
        &self,
        ticket: u64,
        user_id: Option<UserId>,
        notes: Vec<Note>,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let mut state = self.state.write().await;
        if state.user_id() != user_id {
            debug!("session changed during notification check, discarding snapshot");
            return Vec::new();
        }
        if !state.accept_feed(ticket) {
            debug!(ticket, "newer feed snapshot already applied, discarding");
            return Vec::new();
        }

        let check = check_for_new_notifications(&notes, user_id, state.last_checked, &state.notifications, now);
        state.notes = notes;
        state.notifications = check.notifications;
        state.last_checked = check.last_checked;

        if !check.added.is_empty() {
            debug!(count = check.added.len(), last_checked = %state.last_checked, "new notifications");
        }
        check.added
    }

    pub async fn mark_notifications_read(&self) {
        let mut state = self.state.write().await;
        state.notifications = mark_all_notifications_read(&state.notifications);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn has_unread(&self) -> bool {
        has_unread(&self.state.read().await.notifications)
    }

    pub async fn unread_count(&self) -> usize {
        unread_count(&self.state.read().await.notifications)
    }

    pub async fn last_checked(&self) -> DateTime<Utc> {
        self.state.read().await.last_checked
    }
}
