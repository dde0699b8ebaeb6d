//! Handlers for events and the public registration flow.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/events` | All events |
//! | `GET`  | `/events/{id}` | 404 if not found |
//! | `GET`  | `/events/{id}/registration` | Event plus the registration form |
//! | `POST` | `/events/{id}/registration` | Register; mails a confirmation link |
//! | `GET`  | `/events/registration/{token}` | Confirm; returns the edit form |
//! | `POST` | `/events/registration/{token}` | Replace the registration data |

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use memberdb_core::{
  Error as CoreError, MemberStore, Notifier,
  event::{Event, EventId},
  registration::{self, Registered},
};
use serde_json::{Map, Value, json};

use super::{JsonBody, success};
use crate::{AppState, error::{Error, Result}};

async fn load_event<S, N>(state: &AppState<S, N>, id: EventId) -> Result<Event>
where
  S: MemberStore,
  N: Notifier,
{
  state
    .store
    .get_event(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| CoreError::NotFound("event".to_owned()).into())
}

/// Whether a rejection is about the submitted input, so the form should be
/// shown again.
fn is_input_error(err: &CoreError) -> bool {
  matches!(
    err,
    CoreError::FormValidation(_) | CoreError::SchemaValidation { .. } | CoreError::MissingField(_)
  )
}

fn outcome_message(outcome: Registered) -> &'static str {
  match outcome {
    Registered::Created => {
      "Um deine Registrierung abzuschließen, klicke auf den Bestätigungslink in der Email, \
       die wir dir geschickt haben! Erst dann bist du angemeldet."
    }
    Registered::AlreadyPending => {
      "Du hast bereits eine Anmeldung für diese Veranstaltung abgeschickt, aber die Anmeldung \
       noch nicht bestätigt. Bitte klicke auf den Link in der Bestätigungsmail."
    }
    Registered::AlreadyConfirmed => {
      "Du bist bereits angemeldet. Falls du deine Daten ändern möchtest, klicke auf den Link \
       in der Bestätigungsmail."
    }
  }
}

/// `GET /events`
pub async fn list<S, N>(State(state): State<AppState<S, N>>) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let events = state.store.list_events().await.map_err(Error::store)?;
  Ok(success(json!({ "events": events })))
}

/// `GET /events/{id}`
pub async fn get_one<S, N>(
  State(state): State<AppState<S, N>>,
  Path(id): Path<EventId>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let event = load_event(&state, id).await?;
  Ok(success(json!({ "event": event })))
}

/// `GET /events/{id}/registration`
pub async fn registration_form<S, N>(
  State(state): State<AppState<S, N>>,
  Path(id): Path<EventId>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let event = load_event(&state, id).await?;
  if !event.registration_open {
    return Err(CoreError::RegistrationClosed(event.name).into());
  }
  let form = registration::registration_form(&event).render(None);
  Ok(success(json!({ "event": event, "form": form })))
}

/// `POST /events/{id}/registration`
pub async fn register<S, N>(
  State(state): State<AppState<S, N>>,
  Path(id): Path<EventId>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<Response>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let event = load_event(&state, id).await?;
  if !event.registration_open {
    return Err(CoreError::RegistrationClosed(event.name).into());
  }

  let form = registration::registration_form(&event);
  let submission = match form.validate(&event.registration_schema, &body, None) {
    Ok(submission) => submission,
    Err(e) if is_input_error(&e) => {
      return Ok(Error::from(e).with_form(form.render(Some(&body))));
    }
    Err(e) => return Err(e.into()),
  };

  let outcome = state.registrar().register(&event, submission).await?;
  let kind = outcome.kind();
  let status = match kind {
    Registered::Created => StatusCode::CREATED,
    _ => StatusCode::OK,
  };
  let body = success(json!({
    "outcome": kind,
    "message": outcome_message(kind),
  }));
  Ok((status, body).into_response())
}

/// `GET /events/registration/{token}`
pub async fn confirmation<S, N>(
  State(state): State<AppState<S, N>>,
  Path(token): Path<String>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let confirmation = state.registrar().confirm(&token).await?;
  let message = if confirmation.newly_confirmed {
    "Deine Anmeldung ist jetzt bestätigt."
  } else {
    "Du bist angemeldet und kannst deine Angaben hier ändern."
  };
  Ok(success(json!({
    "message": message,
    "event": confirmation.event,
    "registration": confirmation.registration,
    "form": confirmation.render(),
  })))
}

/// `POST /events/registration/{token}`
pub async fn update_registration<S, N>(
  State(state): State<AppState<S, N>>,
  Path(token): Path<String>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<Response>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let registrar = state.registrar();
  match registrar.update(&token, &body).await {
    Ok(confirmation) => Ok(
      success(json!({
        "message": "Deine Angaben wurden gespeichert.",
        "registration": confirmation.registration,
      }))
      .into_response(),
    ),
    Err(e) if is_input_error(&e) => {
      // Show the submitted values again, with the email locked as before.
      let confirmation = registrar.confirm(&token).await?;
      let mut values = body;
      values.insert("email".to_owned(), Value::String(confirmation.person.email.clone()));
      Ok(Error::from(e).with_form(confirmation.form().render(Some(&values))))
    }
    Err(e) => Err(e.into()),
  }
}
