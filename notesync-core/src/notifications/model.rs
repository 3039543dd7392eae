use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notes::{Note, NoteId};

/// Unread activity derived from a community note. Shares the note's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NoteId,
    pub title: String,
    pub timestamp: String,
    pub read: bool,
}

impl From<&Note> for Notification {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            title: note.title.clone(),
            timestamp: note.timestamp.clone(),
            read: false,
        }
    }
}

/// Starting high-water mark: every existing note is newer than this.
pub fn initial_last_checked() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn has_unread(notifications: &[Notification]) -> bool {
    notifications.iter().any(|n| !n.read)
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}
