//! Dynamic forms materialised from a registration schema.
//!
//! A [`FormSpec`] is plain data: one [`FieldSpec`] per caller-supplied
//! identity field followed by one per schema property, in document order.
//! The same `FormSpec` renders a [`FormDescriptor`] for presentation and validates
//! submissions in two passes:
//!
//! 1. per-field checks (required, type coercion, email format, choices);
//! 2. the remaining data, with `email` removed, against the JSON-Schema.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::{
  Error, Result,
  error::FieldError,
  event::RegistrationSchema,
};

const I64_MIN_F: f64 = i64::MIN as f64;

/// Keys that belong to the transport layer and never reach stored data.
pub const FRAMEWORK_FIELDS: &[&str] = &["csrf_token", "submit"];

const REQUIRED: &str = "This field is required.";

// ─── Field specs ─────────────────────────────────────────────────────────────

/// The input kind of a field; decides coercion of submitted values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
  Text,
  Email,
  Integer,
  Number,
  Boolean,
  Select { options: Vec<Value> },
}

impl FieldKind {
  /// Derive the kind from a single schema property.
  fn from_property(property: &Value) -> Self {
    if let Some(options) = property.get("enum").and_then(Value::as_array) {
      return Self::Select { options: options.clone() };
    }

    match schema_type(property) {
      Some("integer") => Self::Integer,
      Some("number") => Self::Number,
      Some("boolean") => Self::Boolean,
      Some("string")
        if property.get("format").and_then(Value::as_str) == Some("email") =>
      {
        Self::Email
      }
      _ => Self::Text,
    }
  }

  /// Turn a raw submitted value into a typed one. `Ok(None)` means the field
  /// was left empty.
  fn coerce(&self, raw: Option<&Value>) -> std::result::Result<Option<Value>, String> {
    let raw = match raw {
      None | Some(Value::Null) => {
        // An unchecked checkbox is simply absent from a submission.
        return Ok(matches!(self, Self::Boolean).then_some(Value::Bool(false)));
      }
      Some(raw) => raw,
    };

    match self {
      Self::Text => match raw {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(_) => Ok(Some(raw.clone())),
        Value::Number(n) => Ok(Some(Value::String(n.to_string()))),
        _ => Err("Not a valid string value.".to_owned()),
      },
      Self::Email => match raw {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
          let address = s.trim();
          address
            .parse::<lettre::Address>()
            .map_err(|_| "Invalid email address.".to_owned())?;
          Ok(Some(Value::String(address.to_owned())))
        }
        _ => Err("Invalid email address.".to_owned()),
      },
      Self::Integer => match raw {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Some(raw.clone())),
        Value::Number(n) => match n.as_f64() {
          // The upper bound is exclusive: `i64::MAX as f64` rounds up to 2^63.
          Some(f) if f.fract() == 0.0 && (I64_MIN_F..-I64_MIN_F).contains(&f) => {
            Ok(Some(Value::from(f as i64)))
          }
          _ => Err("Not a valid integer value.".to_owned()),
        },
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
          .trim()
          .parse::<i64>()
          .map(|i| Some(Value::from(i)))
          .map_err(|_| "Not a valid integer value.".to_owned()),
        _ => Err("Not a valid integer value.".to_owned()),
      },
      Self::Number => match raw {
        Value::Number(_) => Ok(Some(raw.clone())),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_number(s.trim())
          .map(|n| Some(Value::Number(n)))
          .ok_or_else(|| "Not a valid float value.".to_owned()),
        _ => Err("Not a valid float value.".to_owned()),
      },
      Self::Boolean => match raw {
        Value::Bool(b) => Ok(Some(Value::Bool(*b))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
          "y" | "yes" | "on" | "true" | "1" => Ok(Some(Value::Bool(true))),
          "" | "n" | "no" | "off" | "false" | "0" => Ok(Some(Value::Bool(false))),
          _ => Err("Not a valid boolean value.".to_owned()),
        },
        _ => Err("Not a valid boolean value.".to_owned()),
      },
      Self::Select { options } => {
        if raw.as_str().is_some_and(|s| s.is_empty()) {
          return Ok(None);
        }
        // Browsers submit every choice as a string; match on the rendered
        // form too.
        options
          .iter()
          .find(|option| **option == *raw || option_label(option) == option_label(raw))
          .map(|option| Some(option.clone()))
          .ok_or_else(|| "Not a valid choice.".to_owned())
      }
    }
  }
}

fn schema_type(property: &Value) -> Option<&str> {
  match property.get("type")? {
    Value::String(t) => Some(t.as_str()),
    Value::Array(types) => types
      .iter()
      .filter_map(Value::as_str)
      .find(|t| *t != "null"),
    _ => None,
  }
}

fn parse_number(s: &str) -> Option<Number> {
  if let Ok(i) = s.parse::<i64>() {
    return Some(Number::from(i));
  }
  s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn option_label(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Declarative description of one input.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
  pub name:        String,
  pub label:       String,
  pub kind:        FieldKind,
  pub required:    bool,
  /// Rendered read-only; submitted values are ignored in favour of the
  /// initial value.
  pub disabled:    bool,
  pub description: Option<String>,
  pub default:     Option<Value>,
}

impl FieldSpec {
  pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
    Self {
      name: name.into(),
      label: label.into(),
      kind,
      required: false,
      disabled: false,
      description: None,
      default: None,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn disabled(mut self) -> Self {
    self.disabled = true;
    self
  }

  fn from_property(name: &str, property: &Value, required: bool) -> Self {
    let label = property
      .get("title")
      .and_then(Value::as_str)
      .unwrap_or(name)
      .to_owned();
    Self {
      name: name.to_owned(),
      label,
      kind: FieldKind::from_property(property),
      required,
      disabled: false,
      description: property
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned),
      default: property.get("default").cloned(),
    }
  }
}

/// The `name` and `email` fields every registration form starts with.
///
/// When re-showing a registration for editing the email belongs to an
/// already identified person, so it is rendered disabled.
pub fn identity_fields(email_disabled: bool) -> Vec<FieldSpec> {
  let email = FieldSpec::new("email", "Email", FieldKind::Email).required();
  vec![
    FieldSpec::new("name", "Name", FieldKind::Text).required(),
    if email_disabled { email.disabled() } else { email },
  ]
}

// ─── Form ────────────────────────────────────────────────────────────────────

/// A rendered field: its spec plus the value to pre-fill.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
  pub name:        String,
  pub label:       String,
  #[serde(flatten)]
  pub kind:        FieldKind,
  pub required:    bool,
  pub disabled:    bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub value:       Option<Value>,
}

/// Presentation-ready form: ordered fields with their current values.
#[derive(Debug, Clone, Serialize)]
pub struct FormDescriptor {
  pub fields: Vec<Field>,
}

impl FormDescriptor {
  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.name == name)
  }
}

/// Successfully validated input.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
  /// The identity email, split off from the event-specific data.
  pub email: Option<String>,
  /// Everything else, conforming to the registration schema.
  pub data:  Map<String, Value>,
}

impl Submission {
  pub fn name(&self) -> Option<&str> {
    self.data.get("name").and_then(Value::as_str)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormSpec {
  fields: Vec<FieldSpec>,
}

impl FormSpec {
  /// Materialise a form: `additional` fields first, then one field per schema
  /// property. A property sharing a name with an additional field is
  /// shadowed by it, so `email` stays required whatever the schema says.
  pub fn from_schema(schema: &RegistrationSchema, additional: Vec<FieldSpec>) -> Self {
    let required = schema.required();
    let mut fields = additional;

    for (name, property) in schema.properties().into_iter().flatten() {
      if fields.iter().any(|f| f.name == *name) {
        continue;
      }
      let is_required = required.contains(&name.as_str());
      fields.push(FieldSpec::from_property(name, property, is_required));
    }

    Self { fields }
  }

  pub fn fields(&self) -> &[FieldSpec] { &self.fields }

  /// Render with `values` pre-filled, falling back to schema defaults.
  pub fn render(&self, values: Option<&Map<String, Value>>) -> FormDescriptor {
    let fields = self
      .fields
      .iter()
      .map(|spec| Field {
        name:        spec.name.clone(),
        label:       spec.label.clone(),
        kind:        spec.kind.clone(),
        required:    spec.required,
        disabled:    spec.disabled,
        description: spec.description.clone(),
        value:       values
          .and_then(|v| v.get(&spec.name))
          .filter(|v| !v.is_null())
          .or(spec.default.as_ref())
          .cloned(),
      })
      .collect();
    FormDescriptor { fields }
  }

  /// Validate a submission.
  ///
  /// Keys that are not fields of this form (including
  /// [`FRAMEWORK_FIELDS`]) are dropped. Disabled fields take their value
  /// from `initial`. Per-field failures are all collected into
  /// [`Error::FormValidation`]. That includes values of the wrong type,
  /// which fail coercion to the field's kind before the schema is consulted.
  /// A schema violation yields [`Error::SchemaValidation`] with the first
  /// failing constraint.
  pub fn validate(
    &self,
    schema: &RegistrationSchema,
    submitted: &Map<String, Value>,
    initial: Option<&Map<String, Value>>,
  ) -> Result<Submission> {
    let mut errors = Vec::new();
    let mut data = Map::new();

    for spec in &self.fields {
      if FRAMEWORK_FIELDS.contains(&spec.name.as_str()) {
        continue;
      }
      let raw = if spec.disabled {
        initial.and_then(|i| i.get(&spec.name))
      } else {
        submitted.get(&spec.name)
      };

      match spec.kind.coerce(raw) {
        Ok(Some(value)) => {
          data.insert(spec.name.clone(), value);
        }
        Ok(None) if spec.required => errors.push(FieldError {
          field:   spec.name.clone(),
          message: REQUIRED.to_owned(),
        }),
        Ok(None) => {}
        Err(message) => errors.push(FieldError { field: spec.name.clone(), message }),
      }
    }

    if !errors.is_empty() {
      return Err(Error::FormValidation(errors));
    }

    let email = match data.remove("email") {
      Some(Value::String(email)) => Some(email),
      _ => None,
    };

    schema.validate(&data)?;
    Ok(Submission { email, data })
  }
}
