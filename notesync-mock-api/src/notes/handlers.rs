use notesync_core::notes::{normalize_title, sort_newest_first};

use crate::{ctx::BaseParams, state::now, Error, Result};

use super::{CreateNote, Note, NoteId, UpdateNote};

fn title_or_error(title: &str) -> Result<String> {
    normalize_title(title).ok_or_else(|| Error::Validation("Title is required".into()))
}

fn newest_first(mut notes: Vec<Note>) -> Vec<Note> {
    sort_newest_first(&mut notes);
    notes
}

pub async fn find_notes(BaseParams { notes, .. }: BaseParams) -> Result<Vec<Note>> {
    let notes = notes.read().await.values().cloned().collect();
    Ok(newest_first(notes))
}

pub async fn find_user_notes(BaseParams { notes, ctx }: BaseParams) -> Result<Vec<Note>> {
    let user_id = ctx.require_user()?.id;
    let notes = notes
        .read()
        .await
        .values()
        .filter(|n| n.is_owned_by(Some(user_id)))
        .cloned()
        .collect();
    Ok(newest_first(notes))
}

pub async fn create_note(CreateNote { title, content }: CreateNote, BaseParams { notes, ctx }: BaseParams) -> Result<Note> {
    let caller = ctx.require_user()?;
    let note = Note {
        id: uuid::Uuid::now_v7(),
        user_id: Some(caller.id),
        username: caller.username.clone(),
        title: title_or_error(&title)?,
        content,
        timestamp: now(),
    };

    notes.write().await.insert(note.id, note.clone());
    Ok(note)
}

pub async fn get_note(note_id: NoteId, BaseParams { notes, .. }: BaseParams) -> Result<Note> {
    notes
        .read()
        .await
        .get(&note_id)
        .cloned()
        .ok_or_else(|| Error::NotFound("Note not found".into()))
}

pub async fn update_note(note_id: NoteId, UpdateNote { title, content }: UpdateNote, BaseParams { notes, ctx }: BaseParams) -> Result<Note> {
    let caller_id = ctx.require_user()?.id;
    let title = title.as_deref().map(title_or_error).transpose()?;

    let mut notes = notes.write().await;
    let note = notes
        .get_mut(&note_id)
        .ok_or_else(|| Error::NotFound("Note not found".into()))?;
    if !note.is_owned_by(Some(caller_id)) {
        return Err(Error::Forbidden);
    }

    if let Some(title) = title {
        note.title = title;
    }
    if let Some(content) = content {
        note.content = content;
    }
    Ok(note.clone())
}

pub async fn delete_note(note_id: NoteId, BaseParams { notes, ctx }: BaseParams) -> Result<Note> {
    let caller_id = ctx.require_user()?.id;

    let mut notes = notes.write().await;
    match notes.get(&note_id) {
        None => return Err(Error::NotFound("Note not found".into())),
        Some(note) if !note.is_owned_by(Some(caller_id)) => return Err(Error::Forbidden),
        Some(_) => {}
    }

    notes
        .shift_remove(&note_id)
        .ok_or_else(|| Error::NotFound("Note not found".into()))
}
