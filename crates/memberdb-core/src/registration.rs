//! The event registration state machine.
//!
//! ```text
//!   register ──▶ pending ──confirm──▶ confirmed ◀──┐
//!                                        │  update │
//!                                        └─────────┘
//! ```
//!
//! A new registration is committed as `pending` before its confirmation
//! token is minted, so the token only ever references a durable row. The
//! confirmation link never expires and doubles as a personal edit link.
//! The asymmetry with password-reset tokens (ten minutes) is a policy choice.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{
  Error, Result, Settings,
  event::{
    Event, EventRegistration, NewRegistration, RegistrationId, RegistrationStatus,
  },
  form::{FormDescriptor, FormSpec, Submission, identity_fields},
  mail,
  notify::{Notifier, deliver},
  person::{Person, PersonId},
  store::{Admission, MemberStore, get_or_create_person},
  token::{TokenSigner, purpose},
};

/// How a call to [`Registrar::register`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registered {
  /// A new pending registration was stored and a confirmation mail sent.
  Created,
  /// The person registered before but has not confirmed yet.
  AlreadyPending,
  /// The person is already registered and confirmed.
  AlreadyConfirmed,
}

#[derive(Debug, Clone)]
pub struct RegisterOutcome {
  pub person:       Person,
  pub registration: EventRegistration,
  pub created:      bool,
}

impl RegisterOutcome {
  pub fn kind(&self) -> Registered {
    match (self.created, self.registration.status) {
      (true, _) => Registered::Created,
      (false, RegistrationStatus::Pending) => Registered::AlreadyPending,
      (false, RegistrationStatus::Confirmed) => Registered::AlreadyConfirmed,
    }
  }
}

/// A registration reached through its confirmation token.
#[derive(Debug, Clone)]
pub struct Confirmation {
  pub person:          Person,
  pub registration:    EventRegistration,
  pub event:           Event,
  /// `true` only on the visit that moved the registration out of `pending`.
  pub newly_confirmed: bool,
}

impl Confirmation {
  /// The edit form: identity fields first with the email locked to the
  /// person's stored address.
  pub fn form(&self) -> FormSpec {
    FormSpec::from_schema(&self.event.registration_schema, identity_fields(true))
  }

  /// Stored data plus the person's email, for pre-filling the edit form.
  pub fn initial_values(&self) -> Map<String, Value> {
    let mut values = self.registration.data.clone();
    values.insert("email".to_owned(), Value::String(self.person.email.clone()));
    values
  }

  pub fn render(&self) -> FormDescriptor {
    self.form().render(Some(&self.initial_values()))
  }
}

/// The form shown to someone registering for `event`.
pub fn registration_form(event: &Event) -> FormSpec {
  FormSpec::from_schema(&event.registration_schema, identity_fields(false))
}

/// Drives registrations through their lifecycle, touching the store, the
/// token signer and the notifier.
pub struct Registrar<'a, S, N> {
  store:    &'a S,
  notifier: &'a N,
  signer:   &'a TokenSigner,
  settings: &'a Settings,
}

impl<'a, S, N> Registrar<'a, S, N>
where
  S: MemberStore,
  N: Notifier,
{
  pub fn new(
    store: &'a S,
    notifier: &'a N,
    signer: &'a TokenSigner,
    settings: &'a Settings,
  ) -> Self {
    Self { store, notifier, signer, settings }
  }

  /// Absolute confirmation (and edit) link for `token`.
  pub fn confirmation_link(&self, token: &str) -> String {
    self.settings.link(&format!("/events/registration/{token}"))
  }

  /// Register the submitting person for `event`.
  ///
  /// An existing registration is returned untouched with
  /// `created == false`; neither its data nor its status change and no mail
  /// is sent.
  pub async fn register(&self, event: &Event, submission: Submission) -> Result<RegisterOutcome> {
    if !event.registration_open {
      return Err(Error::RegistrationClosed(event.name.clone()));
    }
    let email = submission
      .email
      .as_deref()
      .ok_or_else(|| Error::MissingField("email".to_owned()))?;
    let name = submission
      .name()
      .ok_or_else(|| Error::MissingField("name".to_owned()))?;

    let (person, _) = get_or_create_person(self.store, email, name).await?;

    if let Some(existing) = self.find_registration(event, &person).await? {
      return Ok(RegisterOutcome { person, registration: existing, created: false });
    }

    let inserted = self
      .store
      .insert_registration(NewRegistration {
        event_id:  event.id,
        person_id: person.id,
        status:    RegistrationStatus::Pending,
        data:      submission.data,
        capacity:  event.max_participants,
      })
      .await
      .map_err(Error::store)?;

    let registration = match inserted {
      Admission::Admitted(registration) => registration,
      Admission::Full => return Err(Error::RegistrationFull(event.name.clone())),
      Admission::Conflict => {
        // Lost a race against a concurrent submission for the same pair.
        let existing = self
          .find_registration(event, &person)
          .await?
          .ok_or_else(|| Error::DuplicateEntity("Already registered".to_owned()))?;
        return Ok(RegisterOutcome { person, registration: existing, created: false });
      }
    };

    info!(
      event_id = event.id,
      person_id = person.id,
      registration_id = registration.id,
      "registration pending"
    );

    let token = self
      .signer
      .issue(&(person.id, registration.id), purpose::REGISTRATION)?;
    let link = self.confirmation_link(&token);
    deliver(
      self.notifier,
      mail::confirm_registration(self.settings, &person, event, &link),
    )
    .await?;

    Ok(RegisterOutcome { person, registration, created: true })
  }

  /// Resolve a confirmation token and confirm the registration if it is
  /// still pending. Visiting again is harmless and sends nothing.
  pub async fn confirm(&self, token: &str) -> Result<Confirmation> {
    let (person_id, registration_id): (PersonId, RegistrationId) = self
      .signer
      .verify(token, purpose::REGISTRATION, None)
      .inspect_err(|_| tracing::debug!("rejected registration token"))?;

    let (person, mut registration, event) =
      self.resolve(person_id, registration_id).await?;

    let newly_confirmed = registration.status == RegistrationStatus::Pending;
    if newly_confirmed {
      registration.status = RegistrationStatus::Confirmed;
      self
        .store
        .update_registration(&registration)
        .await
        .map_err(Error::store)?;
      info!(registration_id, event_id = event.id, "registration confirmed");

      let link = self.confirmation_link(token);
      deliver(
        self.notifier,
        mail::registration_confirmed(self.settings, &person, &event, &link),
      )
      .await?;
    }

    Ok(Confirmation { person, registration, event, newly_confirmed })
  }

  /// Replace the registration data through the confirmation link.
  ///
  /// The link confirms a pending registration on the way. The submitted
  /// email is ignored; the person's stored address stays authoritative.
  pub async fn update(&self, token: &str, submitted: &Map<String, Value>) -> Result<Confirmation> {
    let mut confirmation = self.confirm(token).await?;

    let submission = confirmation.form().validate(
      &confirmation.event.registration_schema,
      submitted,
      Some(&confirmation.initial_values()),
    )?;

    confirmation.registration.data = submission.data;
    self
      .store
      .update_registration(&confirmation.registration)
      .await
      .map_err(Error::store)?;
    info!(registration_id = confirmation.registration.id, "registration updated");

    Ok(confirmation)
  }

  async fn find_registration(
    &self,
    event: &Event,
    person: &Person,
  ) -> Result<Option<EventRegistration>> {
    self
      .store
      .find_registration(event.id, person.id)
      .await
      .map_err(Error::store)
  }

  /// Load the rows a token points at. A well-formed token whose ids no
  /// longer resolve, or do not belong together, is treated as not found.
  async fn resolve(
    &self,
    person_id: PersonId,
    registration_id: RegistrationId,
  ) -> Result<(Person, EventRegistration, Event)> {
    let person = self
      .store
      .get_person(person_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("person".to_owned()))?;

    let registration = self
      .store
      .get_registration(registration_id)
      .await
      .map_err(Error::store)?
      .filter(|r| r.person_id == person.id)
      .ok_or_else(|| Error::NotFound("registration".to_owned()))?;

    let event = self
      .store
      .get_event(registration.event_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("event".to_owned()))?;

    Ok((person, registration, event))
  }
}
