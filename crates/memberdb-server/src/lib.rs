//! HTTP layer of the member database.
//!
//! Exposes an axum [`Router`] of JSON endpoints backed by any
//! [`MemberStore`] and [`Notifier`]. Write operations on administrative
//! resources are guarded by access levels checked against HTTP Basic
//! credentials.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod mail;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use memberdb_core::{
  MemberStore, Notifier, Settings, TokenSigner, account::Accounts, membership::Membership,
  registration::Registrar,
};
use serde::Deserialize;

use handlers::{account, admin, events, persons};

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Deserialize, Clone)]
pub struct SmtpConfig {
  pub server:   String,
  #[serde(default = "default_smtp_port")]
  pub port:     u16,
  pub username: String,
  pub password: String,
}

fn default_smtp_port() -> u16 { 587 }

/// Runtime server configuration, deserialised from `config.toml` and
/// `MEMBERDB_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  /// Public URL used for links in outgoing mails.
  pub base_url:     String,
  pub store_path:   PathBuf,
  /// Signing key for every token handed out in links.
  pub secret_key:   String,
  pub mail_sender:  String,
  /// Mailbox notified about new membership applications.
  pub approve_mail: String,
  /// Without SMTP settings mails are only written to the log.
  #[serde(default)]
  pub smtp:         Option<SmtpConfig>,
}

impl ServerConfig {
  pub fn settings(&self) -> Settings {
    Settings {
      mail_sender:  self.mail_sender.clone(),
      approve_mail: self.approve_mail.clone(),
      base_url:     self.base_url.trim_end_matches('/').to_owned(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers. Built once at startup
/// and never mutated.
pub struct AppState<S, N> {
  pub store:    Arc<S>,
  pub notifier: Arc<N>,
  pub signer:   Arc<TokenSigner>,
  pub settings: Arc<Settings>,
}

impl<S, N> Clone for AppState<S, N> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      notifier: Arc::clone(&self.notifier),
      signer:   Arc::clone(&self.signer),
      settings: Arc::clone(&self.settings),
    }
  }
}

impl<S, N> AppState<S, N>
where
  S: MemberStore,
  N: Notifier,
{
  pub fn new(store: S, notifier: N, config: &ServerConfig) -> Self {
    Self {
      store:    Arc::new(store),
      notifier: Arc::new(notifier),
      signer:   Arc::new(TokenSigner::new(&config.secret_key)),
      settings: Arc::new(config.settings()),
    }
  }

  pub fn registrar(&self) -> Registrar<'_, S, N> {
    Registrar::new(&self.store, &self.notifier, &self.signer, &self.settings)
  }

  pub fn membership(&self) -> Membership<'_, S, N> {
    Membership::new(&self.store, &self.notifier, &self.signer, &self.settings)
  }

  pub fn accounts(&self) -> Accounts<'_, S, N> {
    Accounts::new(&self.store, &self.notifier, &self.signer, &self.settings)
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application [`Router`].
pub fn router<S, N>(state: AppState<S, N>) -> Router
where
  S: MemberStore + 'static,
  N: Notifier + 'static,
{
  Router::new()
    // Persons and membership
    .route("/persons", get(persons::list::<S, N>).post(persons::create::<S, N>))
    .route("/members", get(persons::members::<S, N>).post(persons::apply::<S, N>))
    .route("/applications", get(persons::applications::<S, N>))
    .route("/applications/{id}/approve", post(persons::approve::<S, N>))
    .route("/request_edit", post(persons::request_edit::<S, N>))
    .route("/edit/{token}", get(persons::load_edit::<S, N>).post(persons::save_edit::<S, N>))
    // Events and registrations
    .route("/events", get(events::list::<S, N>))
    .route("/events/{id}", get(events::get_one::<S, N>))
    .route(
      "/events/{id}/registration",
      get(events::registration_form::<S, N>).post(events::register::<S, N>),
    )
    .route(
      "/events/registration/{token}",
      get(events::confirmation::<S, N>).post(events::update_registration::<S, N>),
    )
    // Passwords
    .route("/password_reset", post(account::request_reset::<S, N>))
    .route("/password_reset/{token}", post(account::reset::<S, N>))
    // Administration
    .route("/admin/events", post(admin::create_event::<S, N>))
    .route("/admin/events/{id}", put(admin::update_event::<S, N>))
    .route("/admin/events/{id}/registrations", get(admin::registrations::<S, N>))
    .route("/admin/users", post(admin::create_user::<S, N>))
    .route("/admin/users/{id}/roles", post(admin::assign_role::<S, N>))
    .route("/admin/roles", post(admin::put_role::<S, N>))
    .route("/admin/access_levels", post(admin::create_access_level::<S, N>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests;
