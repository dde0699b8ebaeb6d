//! Outbound mail as seen from the workflows.

use std::{
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;

use crate::Result;

/// A plain-text mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
  pub subject:    String,
  pub sender:     String,
  pub recipients: Vec<String>,
  pub body:       String,
}

/// Delivers mails. From the workflows' point of view delivery is
/// fire-and-forget: failures surface as [`crate::Error::Notify`] and are not
/// retried.
pub trait Notifier: Send + Sync {
  fn send(&self, mail: Mail) -> impl Future<Output = Result<()>> + Send + '_;
}

/// Send `mail`, logging a delivery failure before handing it back.
pub(crate) async fn deliver<N: Notifier>(notifier: &N, mail: Mail) -> Result<()> {
  let recipients = mail.recipients.join(", ");
  notifier.send(mail).await.inspect_err(|e| {
    tracing::error!(%recipients, error = %e, "failed to send mail");
  })
}

/// Keeps every mail in memory instead of delivering it. Used by tests and
/// dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutbox {
  sent: Arc<Mutex<Vec<Mail>>>,
}

impl MemoryOutbox {
  pub fn new() -> Self { Self::default() }

  /// Snapshot of all mails sent so far.
  pub fn sent(&self) -> Vec<Mail> {
    self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn len(&self) -> usize {
    self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Notifier for MemoryOutbox {
  async fn send(&self, mail: Mail) -> Result<()> {
    self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(mail);
    Ok(())
  }
}
