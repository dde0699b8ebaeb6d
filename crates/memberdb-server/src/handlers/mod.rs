pub mod account;
pub mod admin;
pub mod events;
pub mod persons;

use axum::{Json, extract::FromRequest};
use memberdb_core::Error as CoreError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// [`Json`] whose rejections render as `{"status": "error"}` documents.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

/// A string parameter that must be present in a JSON body.
pub(crate) fn required_str(body: &Map<String, Value>, key: &str) -> Result<String> {
  body
    .get(key)
    .and_then(Value::as_str)
    .map(str::to_owned)
    .ok_or_else(|| CoreError::MissingField(key.to_owned()).into())
}

/// Decode a JSON body into `T`, reporting failures as unprocessable input.
pub(crate) fn decode<T: DeserializeOwned>(body: Value) -> Result<T> {
  serde_json::from_value(body).map_err(|e| Error::InvalidBody(e.to_string()))
}

/// `{"status": "success", ...fields}`
pub(crate) fn success(fields: Value) -> Json<Value> {
  let mut body = Map::new();
  body.insert("status".to_owned(), json!("success"));
  if let Value::Object(fields) = fields {
    body.extend(fields);
  }
  Json(Value::Object(body))
}
