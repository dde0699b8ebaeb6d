//! Administrative operations. Each one is guarded by the access level that
//! owns the resource.
//!
//! | Method | Path | Access level |
//! |--------|------|--------------|
//! | `POST` | `/admin/events` | `event_admin` |
//! | `PUT`  | `/admin/events/{id}` | `event_admin` |
//! | `GET`  | `/admin/events/{id}/registrations` | `event_registration_admin` |
//! | `POST` | `/admin/users` | `user_admin` |
//! | `POST` | `/admin/users/{id}/roles` | `role_admin` |
//! | `POST` | `/admin/roles` | `role_admin` |
//! | `POST` | `/admin/access_levels` | `access_level_admin` |

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use memberdb_core::{
  Error as CoreError, Insertion, MemberStore, Notifier,
  access::require_access,
  account,
  event::{EventId, NewEvent},
  person::PersonId,
  user::{AccessLevel, Role, UserId, levels},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{JsonBody, decode, success};
use crate::{AppState, auth::Actor, error::{Error, Result}};

// ─── Events ───────────────────────────────────────────────────────────────────

/// `POST /admin/events`, body: [`NewEvent`]. The registration schema is
/// checked against the Draft-07 meta-schema while decoding.
pub async fn create_event<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::EVENT_ADMIN)?;
  let input: NewEvent = decode(body)?;
  let event = state.store.insert_event(input).await.map_err(Error::store)?;
  tracing::info!(event_id = event.id, "event created");
  Ok((StatusCode::CREATED, success(json!({ "event": event }))))
}

/// `PUT /admin/events/{id}`, body: [`NewEvent`]; replaces every field.
pub async fn update_event<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  Path(id): Path<EventId>,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::EVENT_ADMIN)?;
  let input: NewEvent = decode(body)?;
  state
    .store
    .get_event(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| CoreError::NotFound("event".to_owned()))?;

  let event = input.into_event(id);
  state.store.update_event(&event).await.map_err(Error::store)?;
  tracing::info!(event_id = id, "event updated");
  Ok(success(json!({ "event": event })))
}

/// `GET /admin/events/{id}/registrations`
pub async fn registrations<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  Path(id): Path<EventId>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::EVENT_REGISTRATION_ADMIN)?;
  let event = state
    .store
    .get_event(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| CoreError::NotFound("event".to_owned()))?;
  let registrations = state
    .store
    .list_registrations(id)
    .await
    .map_err(Error::store)?;
  Ok(success(json!({ "event": event, "registrations": registrations })))
}

// ─── Users, roles and access levels ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewUserBody {
  pub person_id: PersonId,
  pub username:  String,
  pub password:  String,
}

/// `POST /admin/users`
pub async fn create_user<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::USER_ADMIN)?;
  let body: NewUserBody = decode(body)?;
  if body.password.is_empty() {
    return Err(CoreError::MissingField("password".to_owned()).into());
  }
  let user =
    account::create_user(state.store.as_ref(), body.person_id, &body.username, &body.password)
      .await?;
  Ok((StatusCode::CREATED, success(json!({ "user": user }))))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub id:            String,
  #[serde(default)]
  pub access_levels: Vec<String>,
}

/// `POST /admin/roles`: create a role or replace its access levels.
pub async fn put_role<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::ROLE_ADMIN)?;
  let body: RoleBody = decode(body)?;
  if body.id.trim().is_empty() {
    return Err(CoreError::MissingField("id".to_owned()).into());
  }
  let role = Role::new(body.id, body.access_levels.into_iter().map(AccessLevel::new));
  let role = state.store.put_role(role).await.map_err(Error::store)?;
  Ok(success(json!({ "role": role })))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleBody {
  pub role: String,
}

/// `POST /admin/users/{id}/roles`
pub async fn assign_role<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  Path(id): Path<UserId>,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::ROLE_ADMIN)?;
  let body: AssignRoleBody = decode(body)?;
  let assigned = state
    .store
    .assign_role(id, &body.role)
    .await
    .map_err(Error::store)?;
  if !assigned {
    return Err(CoreError::NotFound("user or role".to_owned()).into());
  }
  tracing::info!(user_id = id, role = %body.role, "role assigned");
  Ok(success(json!({})))
}

#[derive(Debug, Deserialize)]
pub struct AccessLevelBody {
  pub id: String,
}

/// `POST /admin/access_levels`
pub async fn create_access_level<S, N>(
  State(state): State<AppState<S, N>>,
  actor: Actor,
  JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  require_access(actor.user(), levels::ACCESS_LEVEL_ADMIN)?;
  let body: AccessLevelBody = decode(body)?;
  match state
    .store
    .insert_access_level(AccessLevel::new(body.id))
    .await
    .map_err(Error::store)?
  {
    Insertion::Inserted(level) => {
      Ok((StatusCode::CREATED, success(json!({ "access_level": level }))))
    }
    Insertion::Conflict => {
      Err(CoreError::DuplicateEntity("Access level already exists".to_owned()).into())
    }
  }
}
