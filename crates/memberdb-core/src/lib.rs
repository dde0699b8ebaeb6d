//! Core types and workflows for the member database.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Persistence and mail delivery are reached through the [`MemberStore`] and
//! [`Notifier`] traits; the server crate wires concrete backends in.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod account;
pub mod error;
pub mod event;
pub mod form;
pub mod mail;
pub mod membership;
pub mod notify;
pub mod password;
pub mod person;
pub mod registration;
pub mod store;
pub mod token;
pub mod user;

pub use error::{Error, Result};
pub use notify::{Mail, Notifier};
pub use store::{Admission, Insertion, MemberStore};
pub use token::TokenSigner;

/// Process-wide settings shared by the workflows: where mails come from,
/// where membership applications go, and the public URL links point to.
#[derive(Debug, Clone)]
pub struct Settings {
  pub mail_sender:  String,
  pub approve_mail: String,
  /// External base URL without a trailing slash, e.g. `https://example.org`.
  pub base_url:     String,
}

impl Settings {
  /// Absolute URL for `path`, which must start with `/`.
  pub fn link(&self, path: &str) -> String {
    format!("{}{path}", self.base_url.trim_end_matches('/'))
  }
}
