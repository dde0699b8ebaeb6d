//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD`. JSON documents (registration schemas and data) are stored
//! as compact JSON text.

use chrono::{DateTime, NaiveDate, Utc};
use memberdb_core::event::{
  Event, EventRegistration, RegistrationSchema, RegistrationStatus,
};
use memberdb_core::person::Person;
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON documents ──────────────────────────────────────────────────────────

pub fn encode_schema(schema: &RegistrationSchema) -> String {
  schema.as_value().to_string()
}

/// Goes through [`RegistrationSchema`]'s validating deserialiser.
pub fn decode_schema(s: &str) -> Result<RegistrationSchema> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_data(data: &Map<String, Value>) -> Result<String> {
  Ok(serde_json::to_string(data)?)
}

pub fn decode_data(s: &str) -> Result<Map<String, Value>> {
  Ok(serde_json::from_str(s)?)
}

// ─── RegistrationStatus ──────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<RegistrationStatus> {
  s.parse().map_err(|_| Error::UnknownStatus(s.to_owned()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PERSON_COLUMNS: &str =
  "id, name, email, member, member_approved, date_of_birth, joining_date";

/// Raw values read directly from a `persons` row.
pub struct RawPerson {
  pub id:              i64,
  pub name:            String,
  pub email:           String,
  pub member:          bool,
  pub member_approved: bool,
  pub date_of_birth:   Option<String>,
  pub joining_date:    Option<String>,
}

impl RawPerson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      name:            row.get(1)?,
      email:           row.get(2)?,
      member:          row.get(3)?,
      member_approved: row.get(4)?,
      date_of_birth:   row.get(5)?,
      joining_date:    row.get(6)?,
    })
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      id:              self.id,
      name:            self.name,
      email:           self.email,
      member:          self.member,
      member_approved: self.member_approved,
      date_of_birth:   self.date_of_birth.as_deref().map(decode_date).transpose()?,
      joining_date:    self.joining_date.as_deref().map(decode_date).transpose()?,
    })
  }
}

pub const EVENT_COLUMNS: &str = "id, name, description, notify_email, force_tu_mail, \
   max_participants, registration_open, registration_schema";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub id:                  i64,
  pub name:                String,
  pub description:         String,
  pub notify_email:        Option<String>,
  pub force_tu_mail:       bool,
  pub max_participants:    Option<u32>,
  pub registration_open:   bool,
  pub registration_schema: String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      name:                row.get(1)?,
      description:         row.get(2)?,
      notify_email:        row.get(3)?,
      force_tu_mail:       row.get(4)?,
      max_participants:    row.get(5)?,
      registration_open:   row.get(6)?,
      registration_schema: row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      id:                  self.id,
      name:                self.name,
      description:         self.description,
      notify_email:        self.notify_email,
      force_tu_mail:       self.force_tu_mail,
      max_participants:    self.max_participants,
      registration_open:   self.registration_open,
      registration_schema: decode_schema(&self.registration_schema)?,
    })
  }
}

pub const REGISTRATION_COLUMNS: &str =
  "id, event_id, person_id, status_name, data, timestamp";

/// Raw values read directly from an `event_registrations` row.
pub struct RawRegistration {
  pub id:        i64,
  pub event_id:  i64,
  pub person_id: i64,
  pub status:    String,
  pub data:      String,
  pub timestamp: String,
}

impl RawRegistration {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:        row.get(0)?,
      event_id:  row.get(1)?,
      person_id: row.get(2)?,
      status:    row.get(3)?,
      data:      row.get(4)?,
      timestamp: row.get(5)?,
    })
  }

  pub fn into_registration(self) -> Result<EventRegistration> {
    Ok(EventRegistration {
      id:        self.id,
      event_id:  self.event_id,
      person_id: self.person_id,
      status:    decode_status(&self.status)?,
      data:      decode_data(&self.data)?,
      timestamp: decode_dt(&self.timestamp)?,
    })
  }
}

/// Raw values of a `users` row; roles are loaded separately.
pub struct RawUser {
  pub id:            i64,
  pub username:      String,
  pub password_hash: Option<String>,
  pub person_id:     i64,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      username:      row.get(1)?,
      password_hash: row.get(2)?,
      person_id:     row.get(3)?,
    })
  }
}
