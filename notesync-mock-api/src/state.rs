use std::sync::Arc;

use axum::extract::FromRef;
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use notesync_core::notes::{Note, NoteId};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Insertion-ordered, process-local note table.
pub type NoteRepo = Arc<RwLock<IndexMap<NoteId, Note>>>;

#[derive(FromRef, Clone, Default)]
pub struct AppState {
    pub notes: NoteRepo,
}

pub const DEMO_NOTE_TITLE: &str = "Demo note from container";

impl AppState {
    pub fn seeded() -> Self {
        let demo = Note {
            id: Uuid::now_v7(),
            user_id: None,
            username: "demo".into(),
            title: DEMO_NOTE_TITLE.into(),
            content: String::new(),
            timestamp: now(),
        };

        Self {
            notes: Arc::new(RwLock::new(IndexMap::from([(demo.id, demo)]))),
        }
    }
}

pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
