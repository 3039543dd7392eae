use std::cmp::Reverse;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type NoteId = Uuid;

/// A row of the community feed as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// ISO-8601, assigned by the backend on insert.
    pub timestamp: String,
}

impl Note {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Notes without an owner belong to nobody, including the anonymous viewer.
    pub fn is_owned_by(&self, user_id: Option<UserId>) -> bool {
        user_id.is_some() && self.user_id == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNote {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNote {
    pub title: String,
    pub content: String,
}

/// Title must be non-empty once trimmed; the trimmed value is what gets stored.
pub fn normalize_title(title: &str) -> Option<String> {
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_owned())
}

/// Feed order. On equal timestamps the later entry in `notes` comes first.
pub fn sort_newest_first(notes: &mut [Note]) {
    notes.reverse();
    notes.sort_by_key(|n| Reverse(n.created_at()));
}

/// Parses RFC 3339 timestamps, and offset-less ones as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|ts| ts.and_utc())
                .ok()
        })
}
