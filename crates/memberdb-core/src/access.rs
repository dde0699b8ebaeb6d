//! The access control gate.
//!
//! Unauthenticated actors are always told to log in, never "forbidden", so
//! the answer does not reveal whether a resource needs elevated access.

use crate::{Error, Result, user::User};

/// Require an authenticated actor.
pub fn require_login(actor: Option<&User>) -> Result<&User> {
  actor.ok_or(Error::Unauthorized { authenticated: false })
}

/// Require an authenticated actor holding access level `level`.
pub fn require_access<'a>(actor: Option<&'a User>, level: &str) -> Result<&'a User> {
  let user = require_login(actor)?;
  if !user.has_access(level) {
    tracing::info!(user = %user.username, level, "access denied");
    return Err(Error::Unauthorized { authenticated: true });
  }
  Ok(user)
}
