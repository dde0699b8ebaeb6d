//! HTTP Basic-auth extractor.
//!
//! Credentials are checked against stored users. The result is an
//! [`Actor`] that may be anonymous; handlers decide what they require via
//! [`memberdb_core::access`].

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use memberdb_core::{MemberStore, Notifier, account, user::User};

use crate::{AppState, error::Error};

/// The user behind a request, `None` when no or wrong credentials were sent.
#[derive(Debug, Clone)]
pub struct Actor(pub Option<User>);

impl Actor {
  pub fn user(&self) -> Option<&User> { self.0.as_ref() }
}

/// Username and password from an `Authorization: Basic` header.
///
/// `None` when the header is absent. A header that is present but cannot be
/// decoded yields empty credentials, which then fail the lookup like any
/// other wrong login.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?;

  let decoded = value
    .to_str()
    .ok()
    .and_then(|v| v.strip_prefix("Basic "))
    .and_then(|encoded| B64.decode(encoded.trim()).ok())
    .and_then(|bytes| String::from_utf8(bytes).ok());

  let credentials = decoded
    .as_deref()
    .and_then(|creds| creds.split_once(':'))
    .map(|(user, pass)| (user.to_owned(), pass.to_owned()))
    .unwrap_or_default();
  Some(credentials)
}

impl<S, N> FromRequestParts<AppState<S, N>> for Actor
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, N>,
  ) -> Result<Self, Self::Rejection> {
    let Some((username, password)) = basic_credentials(&parts.headers) else {
      return Ok(Actor(None));
    };

    let user = account::authenticate(state.store.as_ref(), &username, &password).await?;
    if user.is_none() {
      tracing::debug!("rejected basic credentials");
    }
    Ok(Actor(user))
  }
}
