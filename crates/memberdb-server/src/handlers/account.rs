//! Password reset by mail.

use axum::{
  extract::{Path, State},
  response::IntoResponse,
};
use memberdb_core::{MemberStore, Notifier};
use serde_json::{Map, Value, json};

use super::{JsonBody, required_str, success};
use crate::{AppState, error::Result};

/// `POST /password_reset`, body `{"user_or_email"}`. Answers the same
/// whether or not the account exists.
pub async fn request_reset<S, N>(
  State(state): State<AppState<S, N>>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let user_or_email = required_str(&body, "user_or_email")?;
  state.accounts().send_password_reset(&user_or_email).await?;
  Ok(success(json!({
    "message": "Falls das Konto existiert, wurde eine Mail zum Zurücksetzen des Passworts verschickt.",
  })))
}

/// `POST /password_reset/{token}`, body `{"new_password", "confirm"}`.
pub async fn reset<S, N>(
  State(state): State<AppState<S, N>>,
  Path(token): Path<String>,
  JsonBody(body): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse>
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  let new_password = required_str(&body, "new_password")?;
  let confirm = required_str(&body, "confirm")?;
  state
    .accounts()
    .reset_password(&token, &new_password, &confirm)
    .await?;
  Ok(success(json!({ "message": "Password changed." })))
}
