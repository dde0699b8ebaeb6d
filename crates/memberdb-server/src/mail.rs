//! Mail delivery: SMTP via `lettre`, or the log when no SMTP server is
//! configured.

use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
  message::header::ContentType, transport::smtp::authentication::Credentials,
};
use memberdb_core::{Error as CoreError, Mail, Notifier, Result};
use tracing::info;

use crate::{ServerConfig, SmtpConfig};

// ─── SMTP ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SmtpNotifier {
  transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
  pub fn new(config: &SmtpConfig) -> Result<Self> {
    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
      .map_err(|e| CoreError::Notify(format!("SMTP relay error: {e}")))?
      .port(config.port)
      .credentials(Credentials::new(config.username.clone(), config.password.clone()))
      .build();
    Ok(Self { transport })
  }
}

/// Build a plain-text message. Recipients may be bare addresses or
/// `Name <address>` mailboxes.
pub fn build_message(mail: &Mail) -> Result<Message> {
  let mut builder = Message::builder()
    .from(
      mail
        .sender
        .parse()
        .map_err(|e| CoreError::Notify(format!("Invalid from address: {e}")))?,
    )
    .subject(mail.subject.as_str())
    .header(ContentType::TEXT_PLAIN);

  for recipient in &mail.recipients {
    builder = builder.to(
      recipient
        .parse()
        .map_err(|e| CoreError::Notify(format!("Invalid to address {recipient:?}: {e}")))?,
    );
  }

  builder
    .body(mail.body.clone())
    .map_err(|e| CoreError::Notify(format!("Failed to build email: {e}")))
}

impl Notifier for SmtpNotifier {
  async fn send(&self, mail: Mail) -> Result<()> {
    let message = build_message(&mail)?;
    self
      .transport
      .send(message)
      .await
      .map_err(|e| CoreError::Notify(format!("Failed to send email: {e}")))?;
    info!(subject = %mail.subject, recipients = %mail.recipients.join(", "), "mail sent");
    Ok(())
  }
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// Writes mails to the log instead of sending them. Used when no SMTP
/// server is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn send(&self, mail: Mail) -> Result<()> {
    info!(
      subject = %mail.subject,
      sender = %mail.sender,
      recipients = %mail.recipients.join(", "),
      "mail (not sent)\n{}",
      mail.body
    );
    Ok(())
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The notifier chosen by the configuration.
#[derive(Clone)]
pub enum ServerNotifier {
  Smtp(SmtpNotifier),
  Log(LogNotifier),
}

impl ServerNotifier {
  pub fn from_config(config: &ServerConfig) -> Result<Self> {
    match &config.smtp {
      Some(smtp) => Ok(Self::Smtp(SmtpNotifier::new(smtp)?)),
      None => {
        tracing::warn!("no SMTP server configured; mails are only logged");
        Ok(Self::Log(LogNotifier))
      }
    }
  }
}

impl Notifier for ServerNotifier {
  async fn send(&self, mail: Mail) -> Result<()> {
    match self {
      Self::Smtp(n) => n.send(mail).await,
      Self::Log(n) => n.send(mail).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mail(to: &str) -> Mail {
    Mail {
      subject:    "Neuer Mitgliedsantrag".to_owned(),
      sender:     "verein@example.org".to_owned(),
      recipients: vec![to.to_owned()],
      body:       "Hallo".to_owned(),
    }
  }

  #[test]
  fn builds_message_for_named_mailbox() {
    let message = build_message(&mail("Ada Lovelace <ada@example.org>")).unwrap();
    let envelope = message.envelope();
    assert_eq!(envelope.to().len(), 1);
    assert_eq!(envelope.to()[0].to_string(), "ada@example.org");
  }

  #[test]
  fn invalid_recipient_is_a_notify_error() {
    let err = build_message(&mail("not an address")).unwrap_err();
    assert!(matches!(err, CoreError::Notify(_)));
  }

  #[tokio::test]
  async fn log_notifier_accepts_everything() {
    LogNotifier.send(mail("ada@example.org")).await.unwrap();
  }
}
