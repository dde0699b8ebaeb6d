//! Handlers for persons, membership applications and self-service edits.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/persons` | `person_admin` |
//! | `POST` | `/persons` | Body: `{"name", "email"}` |
//! | `GET`  | `/members` | Approved members |
//! | `POST` | `/members` | Membership application; body: `{"name", "email"}` |
//! | `GET`  | `/applications` | Login required |
//! | `POST` | `/applications/{id}/approve` | `person_admin` |
//! | `POST` | `/request_edit` | Body: `{"email"}`; mails an edit link |
//! | `GET`  | `/edit/{token}` | The person behind an edit link |
//! | `POST` | `/edit/{token}` | Body: [`PersonEdit`] |

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use memberdb_core::{
  MemberStore, Notifier,
  access::{require_access, require_login},
  membership::PersonEdit,
  person::{PersonFilter, PersonId},
  user::levels,
};
use serde_json::{Map, Value, json};

use super::{JsonBody, decode, required_str, success};
use crate::{AppState, auth::Actor, error::{Error, Result}};

/// `GET /persons`
pub async fn list<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::PERSON_ADMIN)?;
  let persons = state
    .store
    .list_persons(PersonFilter::default())
    .await
    .map_err(Error::store)?;
  Ok(success(json!({ "persons": persons })))
}

/// `POST /persons`
pub async fn create<S, N>(
  State(state): State<AppState<S, N>>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let name = required_str(&body, "name")?;
  let email = required_str(&body, "email")?;
  let person = state.membership().add_person(&name, &email).await?;
  Ok((StatusCode::CREATED, success(json!({ "person": person }))))
}

/// `GET /members`
pub async fn members<S, N>(State(state): State<AppState<S, N>>) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let persons = state
    .store
    .list_persons(PersonFilter::members())
    .await
    .map_err(Error::store)?;
  Ok(success(json!({ "persons": persons })))
}

/// `POST /members`
pub async fn apply<S, N>(
  State(state): State<AppState<S, N>>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let email = required_str(&body, "email")?;
  let name = required_str(&body, "name")?;
  state.membership().apply(&name, &email).await?;
  Ok(success(json!({})))
}

/// `GET /applications`
pub async fn applications<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_login(actor.user())?;
  let persons = state
    .store
    .list_persons(PersonFilter::applications())
    .await
    .map_err(Error::store)?;
  Ok(success(json!({ "persons": persons })))
}

/// `POST /applications/{id}/approve`
pub async fn approve<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  Path(id): Path<PersonId>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let admin = require_access(actor.user(), levels::PERSON_ADMIN)?;
  let person = state
    .membership()
    .approve(id, Utc::now().date_naive())
    .await?;
  tracing::info!(person_id = id, approved_by = %admin.username, "application approved");
  Ok(success(json!({ "person": person })))
}

/// `POST /request_edit`
pub async fn request_edit<S, N>(
  State(state): State<AppState<S, N>>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let email = required_str(&body, "email")?;
  state.membership().request_edit(&email).await?;
  Ok(success(json!({ "message": "Edit mail sent." })))
}

/// `GET /edit/{token}`
pub async fn load_edit<S, N>(
  State(state): State<AppState<S, N>>,
  Path(token): Path<String>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let person = state.membership().load_edit(&token).await?;
  Ok(success(json!({ "person": person })))
}

/// `POST /edit/{token}`
pub async fn save_edit<S, N>(
  State(state): State<AppState<S, N>>,
  Path(token): Path<String>,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let edit: PersonEdit = decode(body)?;
  let person = state.membership().save_edit(&token, edit).await?;
  Ok(success(json!({ "person": person })))
}
