//! Error type and axum [`IntoResponse`] implementation.
//!
//! Every error renders as `{"status": "error", "message": ...}`, plus the
//! per-field errors for rejected form input.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use memberdb_core::form::FormDescriptor;
use serde_json::{Map, Value, json};
use thiserror::Error;

type CoreError = memberdb_core::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] CoreError),

  /// The request body could not be decoded into the expected shape.
  #[error("invalid request body: {0}")]
  InvalidBody(String),

  /// The body was not JSON, or not sent as `application/json`.
  #[error("{}", .0.body_text())]
  Rejected(#[from] JsonRejection),
}

impl Error {
  /// Wrap a backend error from a [`memberdb_core::MemberStore`].
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Core(CoreError::store(e))
  }

  pub fn status(&self) -> StatusCode {
    let e = match self {
      Error::Core(e) => e,
      Error::InvalidBody(_) => return StatusCode::UNPROCESSABLE_ENTITY,
      Error::Rejected(rejection) => return rejection.status(),
    };
    match e {
      CoreError::MissingField(_)
      | CoreError::DuplicateEntity(_)
      | CoreError::SchemaValidation { .. }
      | CoreError::FormValidation(_)
      | CoreError::InvalidSchema(_)
      | CoreError::NoSuchPerson
      | CoreError::PasswordMismatch => StatusCode::UNPROCESSABLE_ENTITY,
      CoreError::InvalidToken | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
      CoreError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
      CoreError::RegistrationClosed(_) | CoreError::RegistrationFull(_) => {
        StatusCode::CONFLICT
      }
      CoreError::Password(_)
      | CoreError::Notify(_)
      | CoreError::Store(_)
      | CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// The JSON error document for this error.
  pub fn body(&self) -> Map<String, Value> {
    let message = match self {
      // Forged and expired tokens look the same from outside.
      Error::Core(CoreError::InvalidToken) => "Not found".to_owned(),
      Error::Core(e @ (CoreError::Store(_) | CoreError::Serialization(_))) => {
        tracing::error!(error = %e, "internal error");
        "Internal server error".to_owned()
      }
      other => other.to_string(),
    };

    let mut body = Map::new();
    body.insert("status".to_owned(), json!("error"));
    body.insert("message".to_owned(), json!(message));
    match self {
      Error::Core(CoreError::FormValidation(errors)) => {
        body.insert("errors".to_owned(), json!(errors));
      }
      Error::Core(CoreError::SchemaValidation { field: Some(field), .. }) => {
        body.insert("field".to_owned(), json!(field));
      }
      _ => {}
    }
    body
  }

  /// Respond with this error and `form` re-rendered with the rejected input.
  pub fn with_form(self, form: FormDescriptor) -> Response {
    let mut body = self.body();
    body.insert("form".to_owned(), json!(form));
    (self.status(), Json(body)).into_response()
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let mut res = (self.status(), Json(self.body())).into_response();
    if matches!(self, Error::Core(CoreError::Unauthorized { authenticated: false })) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"memberdb\""),
      );
    }
    res
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use memberdb_core::error::FieldError;

  use super::*;

  #[test]
  fn status_mapping() {
    let cases = [
      (CoreError::MissingField("name".into()), StatusCode::UNPROCESSABLE_ENTITY),
      (CoreError::NoSuchPerson, StatusCode::UNPROCESSABLE_ENTITY),
      (CoreError::InvalidToken, StatusCode::NOT_FOUND),
      (CoreError::NotFound("event".into()), StatusCode::NOT_FOUND),
      (CoreError::RegistrationFull("x".into()), StatusCode::CONFLICT),
      (CoreError::Notify("smtp down".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
      assert_eq!(Error::from(err).status(), status);
    }
  }

  #[test]
  fn missing_field_message() {
    let body = Error::from(CoreError::MissingField("email".into())).body();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Missing required parameter email");
  }

  #[test]
  fn form_errors_are_listed() {
    let err = Error::from(CoreError::FormValidation(vec![FieldError {
      field:   "email".into(),
      message: "This field is required.".into(),
    }]));
    let body = err.body();
    assert_eq!(body["errors"][0]["field"], "email");
  }

  #[test]
  fn invalid_token_does_not_say_why() {
    let body = Error::from(CoreError::InvalidToken).body();
    assert_eq!(body["message"], "Not found");
  }

  #[test]
  fn only_unauthenticated_gets_challenge() {
    let res = Error::from(CoreError::Unauthorized { authenticated: false }).into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

    let res = Error::from(CoreError::Unauthorized { authenticated: true }).into_response();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(!res.headers().contains_key(header::WWW_AUTHENTICATE));
  }
}
