//! [`SqliteStore`], the SQLite implementation of [`MemberStore`].

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use memberdb_core::{
  event::{
    Event, EventId, EventRegistration, NewEvent, NewRegistration, RegistrationId,
  },
  person::{NewPerson, Person, PersonFilter, PersonId},
  store::{Admission, Insertion, MemberStore},
  user::{AccessLevel, NewUser, Role, User, UserId},
};

use crate::{
  encode::{
    EVENT_COLUMNS, PERSON_COLUMNS, REGISTRATION_COLUMNS, RawEvent, RawPerson,
    RawRegistration, RawUser, encode_data, encode_date, encode_dt, encode_schema,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A member database backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// `true` for UNIQUE and PRIMARY KEY violations. Foreign-key and NOT NULL
/// violations are real errors and are not reported as conflicts.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation
        && matches!(
          e.extended_code,
          rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
  )
}

/// Execute an `INSERT`, returning the new rowid or `None` on a uniqueness
/// conflict.
fn insert_row(
  conn: &rusqlite::Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Option<i64>> {
  match conn.execute(sql, params) {
    Ok(_) => Ok(Some(conn.last_insert_rowid())),
    Err(e) if is_unique_violation(&e) => Ok(None),
    Err(e) => Err(e),
  }
}

/// Load the roles of a user together with their access levels.
fn load_roles(conn: &rusqlite::Connection, user_id: i64) -> rusqlite::Result<Vec<Role>> {
  let mut stmt = conn.prepare(
    "SELECT ur.role_id, ral.access_level_id
       FROM user_roles ur
       LEFT JOIN role_access_levels ral ON ral.role_id = ur.role_id
      WHERE ur.user_id = ?1
      ORDER BY ur.role_id",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![user_id], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut roles: BTreeMap<String, Role> = BTreeMap::new();
  for (role_id, level) in rows {
    let role = roles
      .entry(role_id.clone())
      .or_insert_with(|| Role::new(role_id, Vec::new()));
    if let Some(level) = level {
      role.access_levels.insert(AccessLevel(level));
    }
  }
  Ok(roles.into_values().collect())
}

fn load_user(conn: &rusqlite::Connection, raw: RawUser) -> rusqlite::Result<User> {
  let roles = load_roles(conn, raw.id)?;
  Ok(User {
    id: raw.id,
    username: raw.username,
    password_hash: raw.password_hash,
    person_id: raw.person_id,
    roles,
  })
}

fn ensure_updated(changed: usize, table: &'static str, id: i64) -> Result<()> {
  if changed == 0 {
    return Err(Error::NotFound { table, id: id.to_string() });
  }
  Ok(())
}

// ─── MemberStore impl ────────────────────────────────────────────────────────

impl MemberStore for SqliteStore {
  type Error = Error;

  // ── Persons ───────────────────────────────────────────────────────────────

  async fn insert_person(&self, input: NewPerson) -> Result<Insertion<Person>> {
    let name = input.name.clone();
    let email = input.email.clone();
    let member = input.member;

    let id = self
      .conn
      .call(move |conn| {
        Ok(insert_row(
          conn,
          "INSERT INTO persons (name, email, member) VALUES (?1, ?2, ?3)",
          rusqlite::params![name, email, member],
        )?)
      })
      .await?;

    Ok(match id {
      Some(id) => Insertion::Inserted(Person {
        id,
        name: input.name,
        email: input.email,
        member: input.member,
        member_approved: false,
        date_of_birth: None,
        joining_date: None,
      }),
      None => Insertion::Conflict,
    })
  }

  async fn get_person(&self, id: PersonId) -> Result<Option<Person>> {
    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1"),
            rusqlite::params![id],
            RawPerson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn find_person_by_email(&self, email: &str) -> Result<Option<Person>> {
    let email = email.to_owned();

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE email = ?1"),
            rusqlite::params![email],
            RawPerson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn list_persons(&self, filter: PersonFilter) -> Result<Vec<Person>> {
    let raws: Vec<RawPerson> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PERSON_COLUMNS} FROM persons
            WHERE (?1 IS NULL OR member = ?1)
              AND (?2 IS NULL OR member_approved = ?2)
            ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![filter.member, filter.member_approved],
            RawPerson::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPerson::into_person).collect()
  }

  async fn update_person(&self, person: &Person) -> Result<()> {
    let id = person.id;
    let name = person.name.clone();
    let email = person.email.clone();
    let member = person.member;
    let member_approved = person.member_approved;
    let date_of_birth = person.date_of_birth.map(encode_date);
    let joining_date = person.joining_date.map(encode_date);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE persons
              SET name = ?2, email = ?3, member = ?4, member_approved = ?5,
                  date_of_birth = ?6, joining_date = ?7
            WHERE id = ?1",
          rusqlite::params![
            id,
            name,
            email,
            member,
            member_approved,
            date_of_birth,
            joining_date,
          ],
        )?)
      })
      .await?;

    ensure_updated(changed, "person", id)
  }

  // ── Access control ────────────────────────────────────────────────────────

  async fn insert_access_level(&self, level: AccessLevel) -> Result<Insertion<AccessLevel>> {
    let id = level.as_str().to_owned();

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(insert_row(
          conn,
          "INSERT INTO access_levels (id) VALUES (?1)",
          rusqlite::params![id],
        )?)
      })
      .await?;

    Ok(match inserted {
      Some(_) => Insertion::Inserted(level),
      None => Insertion::Conflict,
    })
  }

  async fn put_role(&self, role: Role) -> Result<Role> {
    let role_id = role.id.clone();
    let levels: Vec<String> =
      role.access_levels.iter().map(|l| l.as_str().to_owned()).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR IGNORE INTO roles (id) VALUES (?1)",
          rusqlite::params![role_id],
        )?;
        tx.execute(
          "DELETE FROM role_access_levels WHERE role_id = ?1",
          rusqlite::params![role_id],
        )?;
        for level in &levels {
          tx.execute(
            "INSERT OR IGNORE INTO access_levels (id) VALUES (?1)",
            rusqlite::params![level],
          )?;
          tx.execute(
            "INSERT INTO role_access_levels (role_id, access_level_id) VALUES (?1, ?2)",
            rusqlite::params![role_id, level],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(role)
  }

  async fn assign_role(&self, user_id: UserId, role_id: &str) -> Result<bool> {
    let role_id = role_id.to_owned();

    let assigned = self
      .conn
      .call(move |conn| {
        let user_exists = conn
          .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        let role_exists = conn
          .query_row(
            "SELECT 1 FROM roles WHERE id = ?1",
            rusqlite::params![role_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !(user_exists && role_exists) {
          return Ok(false);
        }

        conn.execute(
          "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
          rusqlite::params![user_id, role_id],
        )?;
        Ok(true)
      })
      .await?;

    Ok(assigned)
  }

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn insert_user(&self, input: NewUser) -> Result<Insertion<User>> {
    let username = input.username.clone();
    let password_hash = input.password_hash.clone();
    let person_id = input.person_id;

    let id = self
      .conn
      .call(move |conn| {
        Ok(insert_row(
          conn,
          "INSERT INTO users (username, password_hash, person_id) VALUES (?1, ?2, ?3)",
          rusqlite::params![username, password_hash, person_id],
        )?)
      })
      .await?;

    Ok(match id {
      Some(id) => Insertion::Inserted(User {
        id,
        username: input.username,
        password_hash: Some(input.password_hash),
        person_id: input.person_id,
        roles: Vec::new(),
      }),
      None => Insertion::Conflict,
    })
  }

  async fn get_user(&self, id: UserId) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            "SELECT id, username, password_hash, person_id FROM users WHERE id = ?1",
            rusqlite::params![id],
            RawUser::from_row,
          )
          .optional()?;
        Ok(raw.map(|raw| load_user(conn, raw)).transpose()?)
      })
      .await?;

    Ok(user)
  }

  async fn find_user(&self, name_or_email: &str) -> Result<Option<User>> {
    let key = name_or_email.to_owned();

    let user = self
      .conn
      .call(move |conn| {
        // A username match wins over an email match.
        let raw = conn
          .query_row(
            "SELECT u.id, u.username, u.password_hash, u.person_id
               FROM users u
               JOIN persons p ON p.id = u.person_id
              WHERE u.username = ?1 OR p.email = ?1
              ORDER BY u.username = ?1 DESC
              LIMIT 1",
            rusqlite::params![key],
            RawUser::from_row,
          )
          .optional()?;
        Ok(raw.map(|raw| load_user(conn, raw)).transpose()?)
      })
      .await?;

    Ok(user)
  }

  async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<()> {
    let password_hash = password_hash.to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET password_hash = ?2 WHERE id = ?1",
          rusqlite::params![id, password_hash],
        )?)
      })
      .await?;

    ensure_updated(changed, "user", id)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn insert_event(&self, input: NewEvent) -> Result<Event> {
    let name = input.name.clone();
    let description = input.description.clone();
    let notify_email = input.notify_email.clone();
    let force_tu_mail = input.force_tu_mail;
    let max_participants = input.max_participants;
    let registration_open = input.registration_open;
    let schema = encode_schema(&input.registration_schema);

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             name, description, notify_email, force_tu_mail,
             max_participants, registration_open, registration_schema
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            name,
            description,
            notify_email,
            force_tu_mail,
            max_participants,
            registration_open,
            schema,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::debug!(event_id = id, "inserted event");
    Ok(input.into_event(id))
  }

  async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            rusqlite::params![id],
            RawEvent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn list_events(&self) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn update_event(&self, event: &Event) -> Result<()> {
    let id = event.id;
    let name = event.name.clone();
    let description = event.description.clone();
    let notify_email = event.notify_email.clone();
    let force_tu_mail = event.force_tu_mail;
    let max_participants = event.max_participants;
    let registration_open = event.registration_open;
    let schema = encode_schema(&event.registration_schema);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE events
              SET name = ?2, description = ?3, notify_email = ?4,
                  force_tu_mail = ?5, max_participants = ?6,
                  registration_open = ?7, registration_schema = ?8
            WHERE id = ?1",
          rusqlite::params![
            id,
            name,
            description,
            notify_email,
            force_tu_mail,
            max_participants,
            registration_open,
            schema,
          ],
        )?)
      })
      .await?;

    ensure_updated(changed, "event", id)
  }

  // ── Registrations ─────────────────────────────────────────────────────────

  async fn insert_registration(&self, input: NewRegistration) -> Result<Admission> {
    let timestamp = Utc::now();

    let event_id = input.event_id;
    let person_id = input.person_id;
    let capacity = input.capacity;
    let status = input.status.as_str();
    let data = encode_data(&input.data)?;
    let at = encode_dt(timestamp);

    // `None` when the event is full, `Some(None)` on a duplicate pair.
    let slot = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let taken: bool = tx.query_row(
          "SELECT EXISTS(SELECT 1 FROM event_registrations
                          WHERE event_id = ?1 AND person_id = ?2)",
          rusqlite::params![event_id, person_id],
          |row| row.get(0),
        )?;
        if taken {
          return Ok(Some(None));
        }
        if let Some(max) = capacity {
          let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?1",
            rusqlite::params![event_id],
            |row| row.get(0),
          )?;
          if count >= i64::from(max) {
            return Ok(None);
          }
        }
        let id = insert_row(
          &tx,
          "INSERT INTO event_registrations
             (event_id, person_id, status_name, data, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![event_id, person_id, status, data, at],
        )?;
        tx.commit()?;
        Ok(Some(id))
      })
      .await?;

    Ok(match slot {
      Some(Some(id)) => Admission::Admitted(EventRegistration {
        id,
        event_id: input.event_id,
        person_id: input.person_id,
        status: input.status,
        data: input.data,
        timestamp,
      }),
      Some(None) => Admission::Conflict,
      None => {
        tracing::debug!(event_id, "registration refused, event full");
        Admission::Full
      }
    })
  }

  async fn get_registration(&self, id: RegistrationId) -> Result<Option<EventRegistration>> {
    let raw: Option<RawRegistration> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {REGISTRATION_COLUMNS} FROM event_registrations WHERE id = ?1"),
            rusqlite::params![id],
            RawRegistration::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRegistration::into_registration).transpose()
  }

  async fn find_registration(
    &self,
    event_id: EventId,
    person_id: PersonId,
  ) -> Result<Option<EventRegistration>> {
    let raw: Option<RawRegistration> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {REGISTRATION_COLUMNS} FROM event_registrations
                WHERE event_id = ?1 AND person_id = ?2"
            ),
            rusqlite::params![event_id, person_id],
            RawRegistration::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawRegistration::into_registration).transpose()
  }

  async fn list_registrations(&self, event_id: EventId) -> Result<Vec<EventRegistration>> {
    let raws: Vec<RawRegistration> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REGISTRATION_COLUMNS} FROM event_registrations
            WHERE event_id = ?1
            ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![event_id], RawRegistration::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRegistration::into_registration).collect()
  }

  async fn count_registrations(&self, event_id: EventId) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?1",
          rusqlite::params![event_id],
          |row| row.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  async fn update_registration(&self, registration: &EventRegistration) -> Result<()> {
    let id = registration.id;
    let status = registration.status.as_str();
    let data = encode_data(&registration.data)?;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE event_registrations SET status_name = ?2, data = ?3 WHERE id = ?1",
          rusqlite::params![id, status, data],
        )?)
      })
      .await?;

    ensure_updated(changed, "registration", id)
  }
}
