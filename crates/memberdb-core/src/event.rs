//! Events, their registration schema, and event registrations.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result, person::PersonId};

pub type EventId = i64;
pub type RegistrationId = i64;

// ─── Registration schema ─────────────────────────────────────────────────────

/// A Draft-07 JSON-Schema document describing event-specific registration
/// data.
///
/// The only ways to obtain one are [`RegistrationSchema::new`] and
/// deserialisation, which goes through `new`; holding a value therefore
/// proves the document passed meta-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RegistrationSchema(Value);

impl RegistrationSchema {
  pub fn new(schema: Value) -> Result<Self> {
    if !schema.is_object() {
      return Err(Error::InvalidSchema(
        "registration schema must be a JSON object".to_owned(),
      ));
    }
    compile(&schema)?;
    Ok(Self(schema))
  }

  /// A schema without any event-specific properties.
  pub fn empty() -> Self {
    Self(serde_json::json!({ "type": "object", "properties": {} }))
  }

  pub fn as_value(&self) -> &Value { &self.0 }

  /// The `properties` map, in document order.
  pub fn properties(&self) -> Option<&Map<String, Value>> {
    self.0.get("properties").and_then(Value::as_object)
  }

  /// Names listed in the top-level `required` array.
  pub fn required(&self) -> Vec<&str> {
    self
      .0
      .get("required")
      .and_then(Value::as_array)
      .map(|names| names.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default()
  }

  /// Validate `data` against the schema, reporting the first violation.
  pub fn validate(&self, data: &Map<String, Value>) -> Result<()> {
    let compiled = compile(&self.0)?;
    let instance = Value::Object(data.clone());
    let result = compiled.validate(&instance);
    if let Err(mut errors) = result
      && let Some(first) = errors.next()
    {
      let pointer = first.instance_path.to_string();
      return Err(Error::SchemaValidation {
        field:   (!pointer.is_empty()).then_some(pointer),
        message: first.to_string(),
      });
    }
    Ok(())
  }
}

fn compile(schema: &Value) -> Result<JSONSchema> {
  JSONSchema::options()
    .with_draft(Draft::Draft7)
    .compile(schema)
    .map_err(|e| Error::InvalidSchema(e.to_string()))
}

impl TryFrom<Value> for RegistrationSchema {
  type Error = Error;

  fn try_from(value: Value) -> Result<Self> { Self::new(value) }
}

impl From<RegistrationSchema> for Value {
  fn from(schema: RegistrationSchema) -> Self { schema.0 }
}

impl Default for RegistrationSchema {
  fn default() -> Self { Self::empty() }
}

// ─── Event ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub id:                  EventId,
  pub name:                String,
  /// May contain HTML.
  pub description:         String,
  pub notify_email:        Option<String>,
  pub force_tu_mail:       bool,
  pub max_participants:    Option<u32>,
  pub registration_open:   bool,
  pub registration_schema: RegistrationSchema,
}

/// Input to [`crate::store::MemberStore::insert_event`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEvent {
  pub name:                String,
  #[serde(default)]
  pub description:         String,
  pub notify_email:        Option<String>,
  #[serde(default)]
  pub force_tu_mail:       bool,
  pub max_participants:    Option<u32>,
  #[serde(default)]
  pub registration_open:   bool,
  #[serde(default)]
  pub registration_schema: RegistrationSchema,
}

impl NewEvent {
  pub fn into_event(self, id: EventId) -> Event {
    Event {
      id,
      name: self.name,
      description: self.description,
      notify_email: self.notify_email,
      force_tu_mail: self.force_tu_mail,
      max_participants: self.max_participants,
      registration_open: self.registration_open,
      registration_schema: self.registration_schema,
    }
  }
}

// ─── Registrations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
  Pending,
  Confirmed,
}

impl RegistrationStatus {
  pub const ALL: [Self; 2] = [Self::Pending, Self::Confirmed];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Confirmed => "confirmed",
    }
  }
}

impl fmt::Display for RegistrationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for RegistrationStatus {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "pending" => Ok(Self::Pending),
      "confirmed" => Ok(Self::Confirmed),
      other => Err(format!("unknown registration status: {other:?}")),
    }
  }
}

/// One person's registration for one event. `(event_id, person_id)` is
/// unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRegistration {
  pub id:        RegistrationId,
  pub event_id:  EventId,
  pub person_id: PersonId,
  pub status:    RegistrationStatus,
  pub data:      Map<String, Value>,
  pub timestamp: DateTime<Utc>,
}

/// Input to [`crate::store::MemberStore::insert_registration`].
#[derive(Debug, Clone)]
pub struct NewRegistration {
  pub event_id:  EventId,
  pub person_id: PersonId,
  pub status:    RegistrationStatus,
  pub data:      Map<String, Value>,
  /// Refuse the insert once the event holds this many registrations.
  pub capacity:  Option<u32>,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn shirt_schema() -> RegistrationSchema {
    RegistrationSchema::new(json!({
      "properties": { "t_shirt_size": { "enum": ["S", "M", "L"] } },
      "required": ["t_shirt_size"]
    }))
    .unwrap()
  }

  fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn rejects_malformed_schema() {
    let err = RegistrationSchema::new(json!({ "type": 12 })).unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));

    let err = RegistrationSchema::new(json!(["not", "an", "object"])).unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));
  }

  #[test]
  fn deserialisation_validates() {
    let parsed: std::result::Result<RegistrationSchema, _> =
      serde_json::from_value(json!({ "required": "nope" }));
    assert!(parsed.is_err());

    let parsed: RegistrationSchema =
      serde_json::from_value(json!({ "properties": {} })).unwrap();
    assert!(parsed.properties().unwrap().is_empty());
  }

  #[test]
  fn conforming_data_passes() {
    let schema = shirt_schema();
    schema
      .validate(&data(json!({ "name": "Ada", "t_shirt_size": "M" })))
      .unwrap();
  }

  #[test]
  fn first_violation_names_the_field() {
    let schema = shirt_schema();
    let err = schema
      .validate(&data(json!({ "t_shirt_size": 42 })))
      .unwrap_err();
    match err {
      Error::SchemaValidation { field, .. } => {
        assert_eq!(field.as_deref(), Some("/t_shirt_size"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn missing_required_is_reported_at_root() {
    let err = shirt_schema().validate(&Map::new()).unwrap_err();
    match err {
      Error::SchemaValidation { field, message } => {
        assert_eq!(field, None);
        assert!(message.contains("t_shirt_size"), "{message}");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn status_parses() {
    for status in RegistrationStatus::ALL {
      assert_eq!(status.as_str().parse::<RegistrationStatus>(), Ok(status));
    }
    assert!("registered".parse::<RegistrationStatus>().is_err());
  }
}
