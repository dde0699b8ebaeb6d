//! Error types for `memberdb-core`.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   String,
  pub message: String,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("Missing required parameter {0}")]
  MissingField(String),

  #[error("{0}")]
  DuplicateEntity(String),

  /// Submitted data violates the event's registration schema. `field` is the
  /// JSON pointer of the offending value, if it is not the document root.
  #[error("{message}")]
  SchemaValidation {
    field:   Option<String>,
    message: String,
  },

  #[error("invalid form input")]
  FormValidation(Vec<FieldError>),

  #[error("invalid registration schema: {0}")]
  InvalidSchema(String),

  #[error("invalid token")]
  InvalidToken,

  #[error("{0} not found")]
  NotFound(String),

  #[error("No such person")]
  NoSuchPerson,

  /// Unauthenticated actors are asked to log in; authenticated ones are
  /// told access is denied, whatever the resource.
  #[error("{}", if *authenticated { "Access denied" } else { "Login required" })]
  Unauthorized { authenticated: bool },

  #[error("registration for {0:?} is currently not possible")]
  RegistrationClosed(String),

  #[error("{0:?} has reached its maximum number of participants")]
  RegistrationFull(String),

  #[error("Passwords must match")]
  PasswordMismatch,

  #[error("password hashing error: {0}")]
  Password(String),

  #[error("mail delivery failed: {0}")]
  Notify(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error from a [`crate::MemberStore`] implementation.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
