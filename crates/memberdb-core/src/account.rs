//! Login accounts: creation, authentication, password reset.

use tracing::info;

use crate::{
  Error, Result, Settings, mail,
  notify::{Notifier, deliver},
  password::{hash_password, verify_password},
  person::PersonId,
  store::{Insertion, MemberStore},
  token::{PASSWORD_RESET_MAX_AGE, TokenSigner, purpose},
  user::{NewUser, User, UserId},
};

/// Check a username/password pair. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub async fn authenticate<S: MemberStore>(
  store: &S,
  username: &str,
  password: &str,
) -> Result<Option<User>> {
  let user = store.find_user(username).await.map_err(Error::store)?;
  Ok(user.filter(|u| {
    u.password_hash
      .as_deref()
      .is_some_and(|hash| verify_password(password, hash))
  }))
}

/// Create a login for an existing person; the password is hashed on write.
pub async fn create_user<S: MemberStore>(
  store: &S,
  person_id: PersonId,
  username: &str,
  password: &str,
) -> Result<User> {
  store
    .get_person(person_id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound("person".to_owned()))?;

  let input = NewUser {
    username: username.to_owned(),
    password_hash: hash_password(password)?,
    person_id,
  };
  match store.insert_user(input).await.map_err(Error::store)? {
    Insertion::Inserted(user) => {
      info!(user_id = user.id, person_id, "created user");
      Ok(user)
    }
    Insertion::Conflict => Err(Error::DuplicateEntity("User already exists".to_owned())),
  }
}

pub struct Accounts<'a, S, N> {
  store:    &'a S,
  notifier: &'a N,
  signer:   &'a TokenSigner,
  settings: &'a Settings,
}

impl<'a, S, N> Accounts<'a, S, N>
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

  /// Mail a password-reset link to the user known by `user_or_email`.
  ///
  /// Unknown users are silently ignored so the answer does not reveal which
  /// accounts exist.
  pub async fn send_password_reset(&self, user_or_email: &str) -> Result<()> {
    let Some(user) = self.store.find_user(user_or_email).await.map_err(Error::store)? else {
      info!("password reset requested for unknown user");
      return Ok(());
    };
    let person = self
      .store
      .get_person(user.person_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("person".to_owned()))?;

    let token = self.signer.issue(&user.id, purpose::PASSWORD_RESET)?;
    let link = self.settings.link(&format!("/password_reset/{token}"));
    deliver(self.notifier, mail::password_reset(self.settings, &person, &link)).await
  }

  /// Set a new password through a reset link younger than ten minutes.
  ///
  /// The link names the user by id, so it can only ever change the password
  /// of the account it was sent for.
  pub async fn reset_password(
    &self,
    token: &str,
    new_password: &str,
    confirm: &str,
  ) -> Result<User> {
    let user_id: UserId = self
      .signer
      .verify(token, purpose::PASSWORD_RESET, Some(PASSWORD_RESET_MAX_AGE))
      .inspect_err(|_| tracing::debug!("rejected password reset token"))?;

    if new_password.is_empty() {
      return Err(Error::MissingField("new_password".to_owned()));
    }
    if new_password != confirm {
      return Err(Error::PasswordMismatch);
    }

    let user = self
      .store
      .get_user(user_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound("user".to_owned()))?;

    let hash = hash_password(new_password)?;
    self
      .store
      .set_password_hash(user.id, &hash)
      .await
      .map_err(Error::store)?;
    info!(user_id = user.id, "password reset");

    Ok(User { password_hash: Some(hash), ..user })
  }
}
