//! Best-effort audit trail: every created note is reported to the audit function.
//!
//! Fire-and-forget: failures are logged but never reach the caller.

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::{notes::Note, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCreatedEvent {
    pub title: String,
    pub timestamp: String,
    pub username: String,
    pub note_id: String,
}

impl From<&Note> for NoteCreatedEvent {
    fn from(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            timestamp: note.timestamp.clone(),
            username: note.username.clone(),
            note_id: note.id.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditNotifier {
    client: reqwest::Client,
    url: String,
}

impl AuditNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_owned(),
        })
    }

    /// Must be called from within a tokio runtime.
    pub fn note_created(&self, note: &Note) {
        let client = self.client.clone();
        let url = self.url.clone();
        let event = NoteCreatedEvent::from(note);

        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(url = %url, note_id = %event.note_id, status = %response.status(), "Audit function rejected event");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(url = %url, note_id = %event.note_id, "Failed to deliver audit event: {}", e);
                }
            }
        });
    }
}
