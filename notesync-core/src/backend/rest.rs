use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use super::{email_for, AuthApi, NotesApi, Session, User};
use crate::{
    errors::{UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_MESSAGE},
    notes::{normalize_title, CreateNote, Note, NoteId, UpdateNote, UserId},
    Config, Error, Result,
};

const NOTES_TABLE: &str = "notes";

/// Client for a PostgREST + GoTrue backend (the hosted row store and auth service).
#[derive(Clone, Debug)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    email_domain: String,
}

impl RestBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            email_domain: config.email_domain.clone(),
        })
    }

    fn notes_url(&self) -> String {
        format!("{}/rest/v1/{NOTES_TABLE}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    /// Row-level security keys off the bearer token; anonymous calls use the anon key.
    fn request(&self, method: Method, url: &str, session: Option<&Session>) -> RequestBuilder {
        let token = session.map_or(self.anon_key.as_str(), |s| s.access_token.as_str());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl From<AuthUser> for User {
    fn from(user: AuthUser) -> Self {
        let username = user
            .user_metadata
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Self {
            id: user.id,
            email: user.email,
            username,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user: AuthUser,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user.into(),
        }
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, body = %body, "backend rejected request");
    Err(rejection(status, &body))
}

/// A 401/403 without a recognised auth code still means the credentials were refused.
fn rejection(status: StatusCode, body: &str) -> Error {
    let error = api_error(body);
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) && !error.is_auth_rejection() {
        let message = match error {
            Error::Api { code, message } if code != UNKNOWN_ERROR_CODE => message,
            _ => status.canonical_reason().unwrap_or(UNKNOWN_ERROR_MESSAGE).to_owned(),
        };
        return Error::api(status.as_str(), message);
    }
    error
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(check(response).await?.json::<T>().await?)
}

/// PostgREST answers `{code, message}`, GoTrue `{error_code, msg}` or `{error, error_description}`.
fn api_error(body: &str) -> Error {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Error::unknown();
    };

    let field = |keys: &[&str]| {
        keys.iter().find_map(|key| match value.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    match field(&["error_code", "code", "error"]) {
        Some(code) => Error::Api {
            code,
            message: field(&["message", "msg", "error_description"]).unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.into()),
        },
        None => Error::unknown(),
    }
}

#[async_trait]
impl NotesApi for RestBackend {
    async fn get_all(&self, session: Option<&Session>) -> Result<Vec<Note>> {
        let response = self
            .request(Method::GET, &self.notes_url(), session)
            .query(&[("select", "*"), ("order", "timestamp.desc")])
            .send()
            .await?;

        read_json(response).await
    }

    async fn get_user_notes(&self, session: &Session) -> Result<Vec<Note>> {
        let response = self
            .request(Method::GET, &self.notes_url(), Some(session))
            .query(&[("select", "*"), ("order", "timestamp.desc")])
            .query(&[("user_id", format!("eq.{}", session.user.id))])
            .send()
            .await?;

        read_json(response).await
    }

    async fn create(&self, session: &Session, CreateNote { title, content }: CreateNote) -> Result<Note> {
        let title = normalize_title(&title).ok_or(Error::TitleRequired)?;

        let response = self
            .request(Method::POST, &self.notes_url(), Some(session))
            .header("Prefer", "return=representation")
            .json(&json!({
                "title": title,
                "content": content,
                "user_id": session.user.id,
                "username": session.user.username,
            }))
            .send()
            .await?;

        read_json::<Vec<Note>>(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(Error::unknown)
    }

    async fn update(&self, session: &Session, id: NoteId, UpdateNote { title, content }: UpdateNote) -> Result<Note> {
        let title = normalize_title(&title).ok_or(Error::TitleRequired)?;

        let response = self
            .request(Method::PATCH, &self.notes_url(), Some(session))
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "title": title, "content": content }))
            .send()
            .await?;

        // rows hidden by row-level security come back as an empty representation
        read_json::<Vec<Note>>(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::api("NOT_FOUND", "Note not found"))
    }

    async fn delete(&self, session: &Session, id: NoteId) -> Result<()> {
        let response = self
            .request(Method::DELETE, &self.notes_url(), Some(session))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for RestBackend {
    async fn sign_up(&self, username: &str, password: &str) -> Result<()> {
        let username = username.trim().to_lowercase();
        let response = self
            .request(Method::POST, &self.auth_url("signup"), None)
            .json(&json!({
                "email": email_for(&username, &self.email_domain),
                "password": password,
                "data": { "username": username },
            }))
            .send()
            .await?;

        read_json::<Value>(response).await?;
        Ok(())
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let response = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "password")])
            .json(&json!({
                "email": email_for(username, &self.email_domain),
                "password": password,
            }))
            .send()
            .await?;

        Ok(read_json::<TokenResponse>(response).await?.into())
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .request(Method::POST, &self.auth_url("logout"), Some(session))
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn get_user(&self, session: &Session) -> Result<User> {
        let response = self
            .request(Method::GET, &self.auth_url("user"), Some(session))
            .send()
            .await?;

        Ok(read_json::<AuthUser>(response).await?.into())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let response = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        Ok(read_json::<TokenResponse>(response).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use uuid::{uuid, Uuid};

    use super::*;

    const USER_ID: Uuid = uuid!("018f6146-32f4-7948-8289-cfb5cdb2b2af");
    const NOTE_ID: Uuid = uuid!("018f6138-5b4f-722d-97c5-29b927cedbd4");

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    async fn list_notes(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        if header(&headers, "apikey") != Some("anon") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if params.get("order").map(String::as_str) != Some("timestamp.desc") {
            return (StatusCode::BAD_REQUEST, Json(json!({ "code": "PGRST100", "message": "bad order" }))).into_response();
        }

        let owner = params.get("user_id").cloned();
        let mut rows = vec![json!({
            "id": NOTE_ID,
            "user_id": USER_ID,
            "username": "alice",
            "title": "Hello",
            "content": "",
            "timestamp": "2024-01-02T00:00:00+00:00"
        })];
        if owner.is_none() {
            rows.push(json!({
                "id": Uuid::nil(),
                "user_id": null,
                "username": "ghost",
                "title": "Older",
                "content": "x",
                "timestamp": "2023-01-02T00:00:00+00:00"
            }));
        }
        Json(rows).into_response()
    }

    async fn insert_note(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        if header(&headers, "prefer") != Some("return=representation")
            || header(&headers, "authorization") != Some("Bearer token")
        {
            return StatusCode::BAD_REQUEST.into_response();
        }

        (
            StatusCode::CREATED,
            Json(json!([{
                "id": NOTE_ID,
                "user_id": body["user_id"],
                "username": body["username"],
                "title": body["title"],
                "content": body["content"],
                "timestamp": "2024-01-02T00:00:00+00:00"
            }])),
        )
            .into_response()
    }

    async fn update_note() -> impl IntoResponse {
        Json(json!([]))
    }

    fn token_body(access_token: &str, refresh_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "user": {
                "id": USER_ID,
                "email": "alice@notesync.com",
                "user_metadata": { "username": "alice" }
            }
        })
    }

    async fn token(Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>) -> impl IntoResponse {
        if params.get("grant_type").map(String::as_str) == Some("refresh_token") {
            if body["refresh_token"] != "refresh" {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "code": 400, "error_code": "refresh_token_not_found", "msg": "Invalid Refresh Token: Refresh Token Not Found" })),
                )
                    .into_response();
            }
            return Json(token_body("token2", "refresh2")).into_response();
        }

        if body["email"] != "alice@notesync.com" || body["password"] != "secret" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials" })),
            )
                .into_response();
        }

        Json(token_body("token", "refresh")).into_response()
    }

    async fn current_user(headers: HeaderMap) -> impl IntoResponse {
        match header(&headers, "authorization") {
            Some("Bearer token") => Json(json!({
                "id": USER_ID,
                "email": "alice@notesync.com",
                "user_metadata": { "username": "alice" }
            }))
            .into_response(),
            Some("Bearer expired") => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": 401, "error_code": "bad_jwt", "msg": "invalid JWT: token is expired" })),
            )
                .into_response(),
            _ => (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response(),
        }
    }

    async fn spawn_backend_with_key(anon_key: &str) -> RestBackend {
        let router = Router::new()
            .route("/rest/v1/notes", get(list_notes).post(insert_note).patch(update_note))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(current_user));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        RestBackend::new(&Config::new(format!("http://{addr}/"), anon_key)).unwrap()
    }

    async fn spawn_backend() -> RestBackend {
        spawn_backend_with_key("anon").await
    }

    fn session() -> Session {
        Session {
            access_token: "token".into(),
            refresh_token: None,
            user: User {
                id: USER_ID,
                email: Some("alice@notesync.com".into()),
                username: Some("alice".into()),
            },
        }
    }

    #[tokio::test]
    async fn get_all_fetches_feed() {
        let backend = spawn_backend().await;

        let notes = backend.get_all(None).await.unwrap();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "Hello");
        assert_eq!(notes[1].user_id, None);
    }

    #[tokio::test]
    async fn get_user_notes_filters_by_owner() {
        let backend = spawn_backend().await;

        let notes = backend.get_user_notes(&session()).await.unwrap();

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_id, Some(USER_ID));
    }

    #[tokio::test]
    async fn create_returns_inserted_row() {
        let backend = spawn_backend().await;

        let note = backend
            .create(
                &session(),
                CreateNote {
                    title: "  Hello  ".into(),
                    content: "world".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(note.title, "Hello");
        assert_eq!(note.username, "alice");
        assert_eq!(note.user_id, Some(USER_ID));
    }

    #[tokio::test]
    async fn create_rejects_blank_title_before_sending() {
        let backend = RestBackend::new(&Config::new("http://127.0.0.1:1", "anon")).unwrap();

        let result = backend
            .create(
                &session(),
                CreateNote {
                    title: "   ".into(),
                    content: String::new(),
                },
            )
            .await;

        assert!(matches!(result, Err(Error::TitleRequired)));
    }

    #[tokio::test]
    async fn update_of_hidden_row_is_not_found() {
        let backend = spawn_backend().await;

        let result = backend
            .update(
                &session(),
                NOTE_ID,
                UpdateNote {
                    title: "x".into(),
                    content: String::new(),
                },
            )
            .await;

        assert!(matches!(result, Err(Error::Api { code, .. }) if code == "NOT_FOUND"));
    }

    #[tokio::test]
    async fn sign_in_builds_session() {
        let backend = spawn_backend().await;

        let session = backend.sign_in("Alice", "secret").await.unwrap();

        assert_eq!(session.access_token, "token");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(session.user.id, USER_ID);
        assert_eq!(session.user.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn sign_in_with_bad_password() {
        let backend = spawn_backend().await;

        let error = backend.sign_in("alice", "wrong").await.unwrap_err();

        match error {
            Error::Api { code, message } => {
                assert_eq!(code, "invalid_credentials");
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let backend = spawn_backend().await;

        let session = backend.refresh_session("refresh").await.unwrap();

        assert_eq!(session.access_token, "token2");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh2"));
        assert_eq!(session.user.id, USER_ID);

        let spent = backend.refresh_session("refresh2-unknown").await.unwrap_err();
        assert_eq!(spent.code(), "refresh_token_not_found");
        assert!(spent.is_auth_rejection());
    }

    #[tokio::test]
    async fn expired_token_is_an_auth_rejection() {
        let backend = spawn_backend().await;
        let mut session = session();

        assert_eq!(backend.get_user(&session).await.unwrap().username.as_deref(), Some("alice"));

        session.access_token = "expired".into();
        let error = backend.get_user(&session).await.unwrap_err();
        assert_eq!(error.code(), "bad_jwt");
        assert!(error.is_auth_rejection());
    }

    #[tokio::test]
    async fn bare_unauthorized_status_is_an_auth_rejection() {
        let backend = spawn_backend_with_key("wrong").await;

        let error = backend.get_all(None).await.unwrap_err();

        assert_eq!(error.code(), "401");
        assert!(error.is_auth_rejection());
    }

    #[tokio::test]
    async fn gateway_error_is_not_an_auth_rejection() {
        let backend = spawn_backend().await;
        let mut session = session();
        session.access_token = "anything".into();

        let error = backend.get_user(&session).await.unwrap_err();

        assert_eq!(error.code(), UNKNOWN_ERROR_CODE);
        assert!(!error.is_auth_rejection());
    }

    #[test]
    fn forbidden_keeps_backend_message() {
        let error = rejection(StatusCode::FORBIDDEN, r#"{"code":"42501","message":"permission denied"}"#);
        assert_eq!(error.to_string(), "403: permission denied");

        let expired = rejection(StatusCode::UNAUTHORIZED, r#"{"code":"PGRST301","message":"JWT expired"}"#);
        assert_eq!(expired.code(), "PGRST301");
    }

    #[test]
    fn api_error_shapes() {
        let postgrest = api_error(r#"{"code":"42501","message":"permission denied"}"#);
        assert!(matches!(postgrest, Error::Api { ref code, ref message } if code == "42501" && message == "permission denied"));

        let gotrue = api_error(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
        assert_eq!(gotrue.code(), "invalid_grant");

        let no_message = api_error(r#"{"code":"PGRST000"}"#);
        assert_eq!(no_message.to_string(), format!("PGRST000: {UNKNOWN_ERROR_MESSAGE}"));

        assert_eq!(api_error("<html>bad gateway</html>").code(), "UNKNOWN_ERROR");
        assert_eq!(api_error("{}").code(), "UNKNOWN_ERROR");
    }
}
