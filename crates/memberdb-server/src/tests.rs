//! Router tests driving requests through `tower::ServiceExt::oneshot`.

use std::path::PathBuf;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use memberdb_core::{
  MemberStore, account,
  notify::MemoryOutbox,
  person::NewPerson,
  user::{AccessLevel, Role, levels},
};
use memberdb_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, ServerConfig, router};

pub(crate) fn test_config() -> ServerConfig {
  ServerConfig {
    host:         "127.0.0.1".to_string(),
    port:         8080,
    base_url:     "https://verein.example.org/".to_string(),
    store_path:   PathBuf::from(":memory:"),
    secret_key:   "test secret".to_string(),
    mail_sender:  "verein@example.org".to_string(),
    approve_mail: "vorstand@example.org".to_string(),
    smtp:         None,
  }
}

type TestState = AppState<SqliteStore, MemoryOutbox>;

async fn make_state() -> (TestState, MemoryOutbox) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let outbox = MemoryOutbox::new();
  (AppState::new(store, outbox.clone(), &test_config()), outbox)
}

/// Create a user `username` (password `secret`) holding a role with `granted`.
async fn seed_user(state: &TestState, username: &str, granted: &[&str]) {
  let person = state
    .store
    .insert_person(NewPerson::new(username, format!("{username}@example.org")))
    .await
    .unwrap()
    .inserted()
    .unwrap();
  let user = account::create_user(state.store.as_ref(), person.id, username, "secret")
    .await
    .unwrap();
  let role_id = format!("{username}-role");
  state
    .store
    .put_role(Role::new(role_id.clone(), granted.iter().map(|l| AccessLevel::new(*l))))
    .await
    .unwrap();
  assert!(state.store.assign_role(user.id, &role_id).await.unwrap());
}

fn auth_header(user: &str, pass: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:{pass}")))
}

async fn call(
  state: TestState,
  method: &str,
  uri: &str,
  auth: Option<&str>,
  body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(user) = auth {
    builder = builder.header(header::AUTHORIZATION, auth_header(user, "secret"));
  }
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };

  let resp = router(state).oneshot(req).await.unwrap();
  let status = resp.status();
  let headers = resp.headers().clone();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, headers, json)
}

fn token_from_last_mail(outbox: &MemoryOutbox, path: &str) -> String {
  let mails = outbox.sent();
  let body = &mails.last().expect("a mail was sent").body;
  let start = body.find(path).expect("link in mail") + path.len();
  body[start..].split_whitespace().next().unwrap().to_owned()
}

async fn create_shirt_event(state: &TestState) -> i64 {
  seed_user(state, "orga", &[levels::EVENT_ADMIN, levels::EVENT_REGISTRATION_ADMIN]).await;
  let (status, _, body) = call(
    state.clone(),
    "POST",
    "/admin/events",
    Some("orga"),
    Some(json!({
      "name": "Sommerfest",
      "registration_open": true,
      "registration_schema": {
        "properties": {"t_shirt_size": {"enum": ["S", "M", "L"]}},
        "required": ["t_shirt_size"],
      },
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["event"]["id"].as_i64().unwrap()
}

// ── Persons ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_person_requires_fields() {
  let (state, _) = make_state().await;
  let (status, _, body) =
    call(state, "POST", "/persons", None, Some(json!({"name": "Ada"}))).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["status"], "error");
  assert_eq!(body["message"], "Missing required parameter email");
}

#[tokio::test]
async fn duplicate_person_is_rejected() {
  let (state, _) = make_state().await;
  let ada = json!({"name": "Ada", "email": "ada@example.org"});

  let (status, _, _) = call(state.clone(), "POST", "/persons", None, Some(ada.clone())).await;
  assert_eq!(status, StatusCode::CREATED);

  let (status, _, body) = call(state, "POST", "/persons", None, Some(ada)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["message"], "Person already exists");
}

#[tokio::test]
async fn person_list_requires_person_admin() {
  let (state, _) = make_state().await;
  seed_user(&state, "helper", &[]).await;
  seed_user(&state, "board", &[levels::PERSON_ADMIN]).await;

  let (status, headers, _) = call(state.clone(), "GET", "/persons", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(headers.contains_key(header::WWW_AUTHENTICATE));

  let (status, headers, body) =
    call(state.clone(), "GET", "/persons", Some("helper"), None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert!(!headers.contains_key(header::WWW_AUTHENTICATE));
  assert_eq!(body["message"], "Access denied");

  let (status, _, body) = call(state, "GET", "/persons", Some("board"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["persons"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn undecodable_bodies_get_error_documents() {
  let (state, _) = make_state().await;

  let req = Request::builder()
    .method("POST")
    .uri("/persons")
    .body(Body::from(r#"{"name": "Ada", "email": "ada@example.org"}"#))
    .unwrap();
  let resp = router(state.clone()).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body: Value = serde_json::from_slice(&bytes).unwrap();
  assert_eq!(body["status"], "error");
  assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

  let req = Request::builder()
    .method("POST")
    .uri("/persons")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{not json"))
    .unwrap();
  let resp = router(state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body: Value = serde_json::from_slice(&bytes).unwrap();
  assert_eq!(body["status"], "error");
}

// ── Membership ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn membership_application_and_approval() {
  let (state, outbox) = make_state().await;
  seed_user(&state, "board", &[levels::PERSON_ADMIN]).await;
  let existing = state
    .store
    .insert_person(NewPerson::new("Ada", "ada@example.org"))
    .await
    .unwrap()
    .inserted()
    .unwrap();

  let application = json!({"name": "Ada", "email": "ada@example.org"});
  let (status, _, _) =
    call(state.clone(), "POST", "/members", None, Some(application.clone())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(outbox.len(), 1);
  assert_eq!(outbox.sent()[0].recipients, vec!["vorstand@example.org".to_owned()]);

  let (status, _, body) =
    call(state.clone(), "POST", "/members", None, Some(application)).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["message"], "Already member");
  assert_eq!(outbox.len(), 1);

  let (status, _, body) = call(state.clone(), "GET", "/applications", Some("board"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["persons"][0]["id"], existing.id);

  let (status, _, body) = call(
    state.clone(),
    "POST",
    &format!("/applications/{}/approve", existing.id),
    Some("board"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["person"]["member_approved"], true);

  let (_, _, body) = call(state, "GET", "/members", None, None).await;
  assert_eq!(body["persons"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn applications_require_login() {
  let (state, _) = make_state().await;
  let (status, _, body) = call(state, "GET", "/applications", None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["message"], "Login required");
}

#[tokio::test]
async fn edit_request_for_unknown_email() {
  let (state, outbox) = make_state().await;
  let (status, _, body) = call(
    state,
    "POST",
    "/request_edit",
    None,
    Some(json!({"email": "nobody@example.org"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["message"], "No such person");
  assert!(outbox.is_empty());
}

#[tokio::test]
async fn edit_link_roundtrip() {
  let (state, outbox) = make_state().await;
  state
    .store
    .insert_person(NewPerson::new("Ada", "ada@example.org"))
    .await
    .unwrap();

  let (status, _, _) = call(
    state.clone(),
    "POST",
    "/request_edit",
    None,
    Some(json!({"email": "ada@example.org"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let token = token_from_last_mail(&outbox, "/edit/");

  let (status, _, body) =
    call(state.clone(), "GET", &format!("/edit/{token}"), None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["person"]["name"], "Ada");

  let (status, _, body) = call(
    state,
    "POST",
    &format!("/edit/{token}"),
    None,
    Some(json!({"name": "Ada Lovelace", "date_of_birth": "1815-12-10"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["person"]["name"], "Ada Lovelace");
  assert_eq!(body["person"]["date_of_birth"], "1815-12-10");
}

// ── Events and registration ──────────────────────────────────────────────────

#[tokio::test]
async fn registration_flow() {
  let (state, outbox) = make_state().await;
  let event_id = create_shirt_event(&state).await;

  let (status, _, body) = call(
    state.clone(),
    "GET",
    &format!("/events/{event_id}/registration"),
    None,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let names: Vec<&str> = body["form"]["fields"]
    .as_array()
    .unwrap()
    .iter()
    .map(|f| f["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["name", "email", "t_shirt_size"]);

  let submission = json!({"name": "Ada", "email": "ada@example.org", "t_shirt_size": "M"});
  let (status, _, body) = call(
    state.clone(),
    "POST",
    &format!("/events/{event_id}/registration"),
    None,
    Some(submission.clone()),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["outcome"], "created");
  assert_eq!(outbox.len(), 1);

  let (status, _, body) = call(
    state.clone(),
    "POST",
    &format!("/events/{event_id}/registration"),
    None,
    Some(submission),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["outcome"], "already_pending");
  assert_eq!(outbox.len(), 1);

  let token = token_from_last_mail(&outbox, "/events/registration/");
  let confirm_uri = format!("/events/registration/{token}");

  let (status, _, body) = call(state.clone(), "GET", &confirm_uri, None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["registration"]["status"], "confirmed");
  let email_field = body["form"]["fields"]
    .as_array()
    .unwrap()
    .iter()
    .find(|f| f["name"] == "email")
    .cloned()
    .unwrap();
  assert_eq!(email_field["disabled"], true);
  assert_eq!(email_field["value"], "ada@example.org");
  assert_eq!(outbox.len(), 2);

  let (status, _, _) = call(state.clone(), "GET", &confirm_uri, None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(outbox.len(), 2);

  let (status, _, body) = call(
    state.clone(),
    "POST",
    &confirm_uri,
    None,
    Some(json!({"name": "Ada", "email": "other@example.org", "t_shirt_size": "L"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["registration"]["data"]["t_shirt_size"], "L");

  let (status, _, body) = call(
    state,
    "GET",
    &format!("/admin/events/{event_id}/registrations"),
    Some("orga"),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let registrations = body["registrations"].as_array().unwrap();
  assert_eq!(registrations.len(), 1);
  assert_eq!(registrations[0]["status"], "confirmed");
  assert_eq!(registrations[0]["data"]["t_shirt_size"], "L");
}

#[tokio::test]
async fn invalid_registration_returns_form_with_input() {
  let (state, outbox) = make_state().await;
  let event_id = create_shirt_event(&state).await;

  let (status, _, body) = call(
    state,
    "POST",
    &format!("/events/{event_id}/registration"),
    None,
    Some(json!({"name": "Ada", "email": "ada@example.org", "t_shirt_size": "XXL"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["errors"][0]["field"], "t_shirt_size");
  let name_field = &body["form"]["fields"][0];
  assert_eq!(name_field["value"], "Ada");
  assert!(outbox.is_empty());
}

#[tokio::test]
async fn closed_event_is_a_conflict() {
  let (state, _) = make_state().await;
  let event_id = create_shirt_event(&state).await;
  let (status, _, _) = call(
    state.clone(),
    "PUT",
    &format!("/admin/events/{event_id}"),
    Some("orga"),
    Some(json!({"name": "Sommerfest", "registration_open": false})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, _) = call(
    state,
    "GET",
    &format!("/events/{event_id}/registration"),
    None,
    None,
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_event_and_bad_token_are_404() {
  let (state, _) = make_state().await;
  let (status, _, _) = call(state.clone(), "GET", "/events/99", None, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _, body) =
    call(state, "GET", "/events/registration/not-a-token", None, None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["message"], "Not found");
}

#[tokio::test]
async fn invalid_schema_is_rejected_on_write() {
  let (state, _) = make_state().await;
  seed_user(&state, "orga", &[levels::EVENT_ADMIN]).await;
  let (status, _, body) = call(
    state,
    "POST",
    "/admin/events",
    Some("orga"),
    Some(json!({"name": "Broken", "registration_schema": {"type": 5}})),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["status"], "error");
}

// ── Accounts ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn password_reset_flow() {
  let (state, outbox) = make_state().await;
  seed_user(&state, "ada", &[]).await;

  let (status, _, _) = call(
    state.clone(),
    "POST",
    "/password_reset",
    None,
    Some(json!({"user_or_email": "nobody"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert!(outbox.is_empty());

  let (status, _, _) = call(
    state.clone(),
    "POST",
    "/password_reset",
    None,
    Some(json!({"user_or_email": "ada@example.org"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let token = token_from_last_mail(&outbox, "/password_reset/");

  let (status, _, body) = call(
    state.clone(),
    "POST",
    &format!("/password_reset/{token}"),
    None,
    Some(json!({"new_password": "a", "confirm": "b"})),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["message"], "Passwords must match");

  let (status, _, _) = call(
    state.clone(),
    "POST",
    &format!("/password_reset/{token}"),
    None,
    Some(json!({"new_password": "changed", "confirm": "changed"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let user = account::authenticate(state.store.as_ref(), "ada", "changed").await.unwrap();
  assert!(user.is_some());
}

#[tokio::test]
async fn role_administration() {
  let (state, _) = make_state().await;
  seed_user(&state, "root", &[levels::ROLE_ADMIN, levels::USER_ADMIN, levels::ACCESS_LEVEL_ADMIN])
    .await;
  let person = state
    .store
    .insert_person(NewPerson::new("Bob", "bob@example.org"))
    .await
    .unwrap()
    .inserted()
    .unwrap();

  let (status, _, body) = call(
    state.clone(),
    "POST",
    "/admin/users",
    Some("root"),
    Some(json!({"person_id": person.id, "username": "bob", "password": "pw"})),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert!(body["user"].get("password_hash").is_none());
  let user_id = body["user"]["id"].as_i64().unwrap();

  let (status, _, _) = call(
    state.clone(),
    "POST",
    "/admin/roles",
    Some("root"),
    Some(json!({"id": "board", "access_levels": [levels::EVENT_ADMIN]})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, _) = call(
    state.clone(),
    "POST",
    &format!("/admin/users/{user_id}/roles"),
    Some("root"),
    Some(json!({"role": "board"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, _, _) = call(
    state.clone(),
    "POST",
    &format!("/admin/users/{user_id}/roles"),
    Some("root"),
    Some(json!({"role": "missing"})),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let user = state.store.get_user(user_id).await.unwrap().unwrap();
  assert!(user.has_access(levels::EVENT_ADMIN));

  let (status, _, _) = call(
    state.clone(),
    "POST",
    "/admin/access_levels",
    Some("root"),
    Some(json!({"id": levels::EVENT_ADMIN})),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
