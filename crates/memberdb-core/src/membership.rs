//! Person records, membership applications and self-service edits of
//! personal data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
  Error, Result, Settings, mail,
  notify::{Notifier, deliver},
  person::{NewPerson, Person, PersonId},
  store::{Insertion, MemberStore, get_or_create_person},
  token::{EDIT_MAX_AGE, TokenSigner, purpose},
};

/// Changes a person may make to their own record through an edit link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonEdit {
  pub name:               String,
  pub date_of_birth:      Option<NaiveDate>,
  /// Apply for membership if not already a member.
  #[serde(default)]
  pub membership_pending: bool,
}

pub struct Membership<'a, S, N> {
  store:    &'a S,
  notifier: &'a N,
  signer:   &'a TokenSigner,
  settings: &'a Settings,
}

impl<'a, S, N> Membership<'a, S, N>
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

  /// Create a person; an existing email is a [`Error::DuplicateEntity`].
  pub async fn add_person(&self, name: &str, email: &str) -> Result<Person> {
    match self
      .store
      .insert_person(NewPerson::new(name, email))
      .await
      .map_err(Error::store)?
    {
      Insertion::Inserted(person) => Ok(person),
      Insertion::Conflict => Err(Error::DuplicateEntity("Person already exists".to_owned())),
    }
  }

  /// Apply for membership: find or create the person by email, flag it as
  /// member and notify the approval mailbox once.
  pub async fn apply(&self, name: &str, email: &str) -> Result<Person> {
    let (mut person, _) = get_or_create_person(self.store, email, name).await?;
    if person.member {
      return Err(Error::DuplicateEntity("Already member".to_owned()));
    }
    self.mark_applied(&mut person).await?;
    Ok(person)
  }

  /// Board approval of a pending application.
  pub async fn approve(&self, person_id: PersonId, today: NaiveDate) -> Result<Person> {
    let mut person = self.person(person_id).await?;
    person.member = true;
    person.member_approved = true;
    person.joining_date.get_or_insert(today);
    self.store.update_person(&person).await.map_err(Error::store)?;
    info!(person_id, "membership approved");
    Ok(person)
  }

  /// Mail an edit link for the person with `email`.
  pub async fn request_edit(&self, email: &str) -> Result<()> {
    let person = self
      .store
      .find_person_by_email(email)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NoSuchPerson)?;

    let token = self.signer.issue(&person.email, purpose::EDIT)?;
    let link = self.settings.link(&format!("/edit/{token}"));
    deliver(
      self.notifier,
      mail::edit_personal_data(self.settings, &person.email, &link),
    )
    .await
  }

  /// The person an edit link was issued for.
  pub async fn load_edit(&self, token: &str) -> Result<Person> {
    let email: String = self
      .signer
      .verify(token, purpose::EDIT, Some(EDIT_MAX_AGE))
      .inspect_err(|_| tracing::debug!("rejected edit token"))?;
    self
      .store
      .find_person_by_email(&email)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("person".to_owned()))
  }

  pub async fn save_edit(&self, token: &str, edit: PersonEdit) -> Result<Person> {
    let mut person = self.load_edit(token).await?;
    if edit.name.trim().is_empty() {
      return Err(Error::MissingField("name".to_owned()));
    }
    person.name = edit.name;
    person.date_of_birth = edit.date_of_birth;

    if edit.membership_pending && !person.member {
      self.mark_applied(&mut person).await?;
    } else {
      self.store.update_person(&person).await.map_err(Error::store)?;
    }
    info!(person_id = person.id, "personal data edited");
    Ok(person)
  }

  async fn mark_applied(&self, person: &mut Person) -> Result<()> {
    person.member = true;
    self.store.update_person(person).await.map_err(Error::store)?;
    info!(person_id = person.id, "membership application received");

    let link = self.settings.link("/applications");
    deliver(
      self.notifier,
      mail::membership_application(self.settings, person, &link),
    )
    .await
  }

  async fn person(&self, id: PersonId) -> Result<Person> {
    self
      .store
      .get_person(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("person".to_owned()))
  }
}
