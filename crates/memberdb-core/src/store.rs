//! The `MemberStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `memberdb-store-sqlite`). Workflows in this crate and the HTTP layer
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::Error;

use crate::{
  event::{
    Event, EventId, EventRegistration, NewEvent, NewRegistration, RegistrationId,
  },
  person::{NewPerson, Person, PersonFilter, PersonId},
  user::{AccessLevel, NewUser, Role, User, UserId},
};

/// Outcome of an insert into a table with a uniqueness constraint.
///
/// A violated constraint is an expected result under concurrent requests,
/// not a backend failure; callers typically re-read the existing row.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion<T> {
  Inserted(T),
  Conflict,
}

impl<T> Insertion<T> {
  pub fn inserted(self) -> Option<T> {
    match self {
      Self::Inserted(t) => Some(t),
      Self::Conflict => None,
    }
  }
}

/// Outcome of [`MemberStore::insert_registration`].
#[derive(Debug, Clone)]
pub enum Admission {
  Admitted(EventRegistration),
  /// The person is already registered for the event.
  Conflict,
  /// The event already holds `capacity` registrations.
  Full,
}

impl Admission {
  pub fn admitted(self) -> Option<EventRegistration> {
    match self {
      Self::Admitted(registration) => Some(registration),
      Self::Conflict | Self::Full => None,
    }
  }
}

/// Abstraction over a member database backend.
///
/// The backend must enforce uniqueness of person emails, usernames, and
/// `(event_id, person_id)` registration pairs, and must enforce foreign keys.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MemberStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Persons ───────────────────────────────────────────────────────────

  /// Insert a person; [`Insertion::Conflict`] if the email is taken.
  fn insert_person(
    &self,
    input: NewPerson,
  ) -> impl Future<Output = Result<Insertion<Person>, Self::Error>> + Send + '_;

  fn get_person(
    &self,
    id: PersonId,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + '_;

  fn find_person_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + 'a;

  fn list_persons(
    &self,
    filter: PersonFilter,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

  /// Overwrite every mutable column of an existing person.
  fn update_person<'a>(
    &'a self,
    person: &'a Person,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Access control ────────────────────────────────────────────────────

  fn insert_access_level(
    &self,
    level: AccessLevel,
  ) -> impl Future<Output = Result<Insertion<AccessLevel>, Self::Error>> + Send + '_;

  /// Create or replace a role together with its full access-level set.
  /// Unknown access levels are created on the fly.
  fn put_role(
    &self,
    role: Role,
  ) -> impl Future<Output = Result<Role, Self::Error>> + Send + '_;

  /// Grant `role_id` to a user. Granting twice is a no-op. Returns `false`
  /// if either the user or the role does not exist.
  fn assign_role<'a>(
    &'a self,
    user_id: UserId,
    role_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Insert a user; [`Insertion::Conflict`] if the username is taken or the
  /// person already has a user.
  fn insert_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<Insertion<User>, Self::Error>> + Send + '_;

  /// Load a user with roles and access levels resolved.
  fn get_user(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Look a user up by username or by the email of its person.
  fn find_user<'a>(
    &'a self,
    name_or_email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  fn set_password_hash<'a>(
    &'a self,
    id: UserId,
    password_hash: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Events ────────────────────────────────────────────────────────────

  fn insert_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    id: EventId,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  fn list_events(&self) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  fn update_event<'a>(
    &'a self,
    event: &'a Event,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Registrations ─────────────────────────────────────────────────────

  /// Insert a registration; [`Admission::Conflict`] if the person is already
  /// registered for the event. The capacity check and the insert are atomic,
  /// so concurrent registrations never exceed `input.capacity`. The store
  /// assigns the timestamp.
  fn insert_registration(
    &self,
    input: NewRegistration,
  ) -> impl Future<Output = Result<Admission, Self::Error>> + Send + '_;

  fn get_registration(
    &self,
    id: RegistrationId,
  ) -> impl Future<Output = Result<Option<EventRegistration>, Self::Error>> + Send + '_;

  fn find_registration(
    &self,
    event_id: EventId,
    person_id: PersonId,
  ) -> impl Future<Output = Result<Option<EventRegistration>, Self::Error>> + Send + '_;

  fn list_registrations(
    &self,
    event_id: EventId,
  ) -> impl Future<Output = Result<Vec<EventRegistration>, Self::Error>> + Send + '_;

  fn count_registrations(
    &self,
    event_id: EventId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Persist `status` and `data` of an existing registration.
  fn update_registration<'a>(
    &'a self,
    registration: &'a EventRegistration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Find the person with `email`, creating it with `name` if absent.
///
/// A concurrent request may insert the same email between the lookup and
/// the insert; the resulting conflict is answered by reading the row again,
/// once. Returns the person and whether it was created.
pub async fn get_or_create_person<S: MemberStore>(
  store: &S,
  email: &str,
  name: &str,
) -> crate::Result<(Person, bool)> {
  if let Some(person) = store.find_person_by_email(email).await.map_err(Error::store)? {
    return Ok((person, false));
  }

  match store
    .insert_person(NewPerson::new(name, email))
    .await
    .map_err(Error::store)?
  {
    Insertion::Inserted(person) => {
      tracing::info!(person_id = person.id, "created person");
      Ok((person, true))
    }
    Insertion::Conflict => store
      .find_person_by_email(email)
      .await
      .map_err(Error::store)?
      .map(|person| (person, false))
      .ok_or_else(|| Error::DuplicateEntity("Person already exists".to_owned())),
  }
}
