use axum::{
    extract::rejection::JsonRejection,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
            ACCESS_CONTROL_MAX_AGE,
        },
        HeaderValue, StatusCode,
    },
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::{Error, Result};

/// Body posted after a note is created. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCreated {
    pub title: Option<String>,
    pub timestamp: Option<String>,
    pub username: Option<String>,
    pub note_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct NoteCreatedNotification {
    pub id: String,
    pub title: String,
    pub timestamp: String,
    pub username: String,
    pub logged_at: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Logged {
    pub success: bool,
    pub message: String,
    pub notification: NoteCreatedNotification,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(log_note_created).options(preflight))
        .route("/log-note-created", post(log_note_created).options(preflight))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_METHODS, "POST"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
}

async fn log_note_created(payload: std::result::Result<Json<NoteCreated>, JsonRejection>) -> Result<Json<Logged>> {
    let Json(NoteCreated {
        title,
        timestamp,
        username,
        note_id,
    }) = payload?;

    let (Some(title), Some(timestamp)) = (present(title), present(timestamp)) else {
        return Err(Error::MissingFields);
    };
    let username = present(username).unwrap_or_else(|| "anonymous".into());

    tracing::info!("[NOTE CREATED] \"{}\" by @{} at {}", title, username, timestamp);

    let now = Utc::now();
    let id = present(note_id).unwrap_or_else(|| format!("note-{}", now.timestamp_millis()));

    Ok(Json(Logged {
        success: true,
        message: "Note creation logged successfully".into(),
        notification: NoteCreatedNotification {
            id,
            title,
            timestamp,
            username,
            logged_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind: "note_created".into(),
        },
    }))
}
