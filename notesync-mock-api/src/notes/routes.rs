use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    ctx::BaseParams,
    extract::{Json, Path},
    state::AppState,
};

use super::{handlers, CreateNote, UpdateNote};

#[derive(Debug, Deserialize)]
struct NoteIdPath {
    note_id: Uuid,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/notes", get(find_notes).post(create_note))
        .route("/api/notes/mine", get(find_user_notes))
        .route(
            "/api/notes/{note_id}",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .with_state(state)
}

async fn find_notes(base: BaseParams) -> impl IntoResponse {
    handlers::find_notes(base).await.map(Json)
}

async fn find_user_notes(base: BaseParams) -> impl IntoResponse {
    handlers::find_user_notes(base).await.map(Json)
}

async fn create_note(base: BaseParams, Json(args): Json<CreateNote>) -> impl IntoResponse {
    handlers::create_note(args, base)
        .await
        .map(|r| (StatusCode::CREATED, Json(r)))
}

async fn get_note(Path(NoteIdPath { note_id }): Path<NoteIdPath>, base: BaseParams) -> impl IntoResponse {
    handlers::get_note(note_id, base).await.map(Json)
}

async fn update_note(
    Path(NoteIdPath { note_id }): Path<NoteIdPath>,
    base: BaseParams,
    Json(args): Json<UpdateNote>,
) -> impl IntoResponse {
    handlers::update_note(note_id, args, base).await.map(Json)
}

async fn delete_note(Path(NoteIdPath { note_id }): Path<NoteIdPath>, base: BaseParams) -> impl IntoResponse {
    handlers::delete_note(note_id, base).await.map(Json)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::{TestRequest, TestServer};
    use serde_json::json;
    use uuid::Uuid;

    use crate::{
        ctx::{USERNAME_HEADER, USER_ID_HEADER},
        errors::Result,
        notes::Note,
        state::{AppState, DEMO_NOTE_TITLE},
    };

    const ALICE: &str = "018f6146-32f4-7948-8289-cfb5cdb2b2af";
    const BOB: &str = "018f6146-32f4-7948-8289-cfb5cdb2b2b0";

    fn as_user(request: TestRequest, user_id: &str, username: &str) -> TestRequest {
        request
            .add_header(
                HeaderName::from_static(USER_ID_HEADER),
                HeaderValue::from_str(user_id).unwrap(),
            )
            .add_header(
                HeaderName::from_static(USERNAME_HEADER),
                HeaderValue::from_str(username).unwrap(),
            )
    }

    async fn create(server: &TestServer, user_id: &str, title: &str) -> Note {
        let response = as_user(server.post("/api/notes"), user_id, "Alice")
            .json(&json!({ "title": title, "content": "hello" }))
            .await;
        assert_eq!(response.status_code(), 201);
        response.json::<Note>()
    }

    #[tokio::test]
    async fn find_notes() -> Result<()> {
        let server = test_server(AppState::seeded()).await?;
        let created = create(&server, ALICE, "second").await;

        let response = server.get("/api/notes").await;

        assert_eq!(response.status_code(), 200);
        let notes = response.json::<Vec<Note>>();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, created.id);
        assert_eq!(notes[1].title, DEMO_NOTE_TITLE);
        Ok(())
    }

    #[tokio::test]
    async fn find_user_notes() -> Result<()> {
        let server = test_server(AppState::seeded()).await?;
        create(&server, ALICE, "mine").await;
        create(&server, BOB, "theirs").await;

        let response = as_user(server.get("/api/notes/mine"), ALICE, "alice").await;

        assert_eq!(response.status_code(), 200);
        let notes = response.json::<Vec<Note>>();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "mine");

        let anonymous = server.get("/api/notes/mine").await;
        assert_eq!(anonymous.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn create_note() -> Result<()> {
        let server = test_server(AppState::default()).await?;

        let note = create(&server, ALICE, "  world  ").await;

        assert_eq!(note.title, "world");
        assert_eq!(note.username, "alice");
        assert_eq!(note.user_id, Some(Uuid::parse_str(ALICE).unwrap()));
        Ok(())
    }

    #[tokio::test]
    async fn create_note_validation() -> Result<()> {
        let server = test_server(AppState::default()).await?;

        let blank = as_user(server.post("/api/notes"), ALICE, "alice")
            .json(&json!({ "title": "   " }))
            .await;
        assert_eq!(blank.status_code(), 400);
        assert_eq!(blank.json::<serde_json::Value>()["message"], "Title is required");

        let missing = as_user(server.post("/api/notes"), ALICE, "alice")
            .json(&json!({ "content": "no title" }))
            .await;
        assert_eq!(missing.status_code(), 400);

        let anonymous = server.post("/api/notes").json(&json!({ "title": "x" })).await;
        assert_eq!(anonymous.status_code(), 401);
        Ok(())
    }

    #[tokio::test]
    async fn get_note() -> Result<()> {
        let server = test_server(AppState::default()).await?;
        let note = create(&server, ALICE, "first").await;

        let response = server.get(&format!("/api/notes/{}", note.id)).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.json::<Note>().title, "first");

        let missing = server.get(&format!("/api/notes/{}", Uuid::nil())).await;
        assert_eq!(missing.status_code(), 404);

        let malformed = server.get("/api/notes/not-a-uuid").await;
        assert_eq!(malformed.status_code(), 400);
        Ok(())
    }

    #[tokio::test]
    async fn update_note() -> Result<()> {
        let server = test_server(AppState::default()).await?;
        let note = create(&server, ALICE, "first").await;
        let path = format!("/api/notes/{}", note.id);

        let response = as_user(server.patch(&path), ALICE, "alice")
            .json(&json!({ "content": "2" }))
            .await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.json::<Note>().title, "first");
        assert_eq!(response.json::<Note>().content, "2");

        let forbidden = as_user(server.patch(&path), BOB, "bob")
            .json(&json!({ "title": "mine now" }))
            .await;
        assert_eq!(forbidden.status_code(), 403);
        Ok(())
    }

    #[tokio::test]
    async fn delete_note() -> Result<()> {
        let state = AppState::default();
        let server = test_server(state.clone()).await?;
        let note = create(&server, ALICE, "first").await;
        let path = format!("/api/notes/{}", note.id);

        let forbidden = as_user(server.delete(&path), BOB, "bob").await;
        assert_eq!(forbidden.status_code(), 403);

        let response = as_user(server.delete(&path), ALICE, "alice").await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.json::<Note>().title, "first");
        assert!(state.notes.read().await.is_empty());

        let again = as_user(server.delete(&path), ALICE, "alice").await;
        assert_eq!(again.status_code(), 404);
        Ok(())
    }

    async fn test_server(state: AppState) -> Result<TestServer> {
        crate::tests::test_server(state, super::router).await
    }
}
