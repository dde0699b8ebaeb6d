//! Users, roles and access levels.
//!
//! Access is granted transitively: a user has access level `L` iff one of its
//! roles carries `L`. Roles are loaded eagerly together with their access
//! levels, so checking access is a pure function over in-memory sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::person::PersonId;

pub type UserId = i64;

/// A named capability, e.g. `event_admin`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccessLevel(pub String);

impl AccessLevel {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

/// Well-known access level names used to guard administrative operations.
pub mod levels {
  pub const EVENT_ADMIN: &str = "event_admin";
  pub const EVENT_REGISTRATION_ADMIN: &str = "event_registration_admin";
  pub const PERSON_ADMIN: &str = "person_admin";
  pub const USER_ADMIN: &str = "user_admin";
  pub const ROLE_ADMIN: &str = "role_admin";
  pub const ACCESS_LEVEL_ADMIN: &str = "access_level_admin";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
  pub id:            String,
  pub access_levels: BTreeSet<AccessLevel>,
}

impl Role {
  pub fn new(
    id: impl Into<String>,
    levels: impl IntoIterator<Item = AccessLevel>,
  ) -> Self {
    Self { id: id.into(), access_levels: levels.into_iter().collect() }
  }

  pub fn grants(&self, name: &str) -> bool {
    self.access_levels.iter().any(|l| l.as_str() == name)
  }
}

/// A login account. Exactly one [`Person`](crate::person::Person) backs each
/// user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id:            UserId,
  pub username:      String,
  /// Argon2 PHC string. Never serialised.
  #[serde(skip_serializing, default)]
  pub password_hash: Option<String>,
  pub person_id:     PersonId,
  pub roles:         Vec<Role>,
}

impl User {
  /// `true` iff any role of this user carries the access level `name`.
  pub fn has_access(&self, name: &str) -> bool {
    self.roles.iter().any(|role| role.grants(name))
  }
}

/// Input to [`crate::store::MemberStore::insert_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username:      String,
  pub password_hash: String,
  pub person_id:     PersonId,
}
