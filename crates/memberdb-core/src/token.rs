//! Signed, purpose-scoped, optionally time-limited tokens.
//!
//! A token is three URL-safe base64 segments joined by `.`:
//!
//! ```text
//! <payload json> . <issued-at, big-endian i64 seconds> . <HMAC-SHA256>
//! ```
//!
//! The MAC covers the purpose string and both leading segments, so a token
//! minted for one purpose never verifies under another. Verification is
//! all-or-nothing; every failure collapses into [`Error::InvalidToken`].

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Purpose strings. A token only verifies under the purpose it was issued for.
pub mod purpose {
  pub const REGISTRATION: &str = "registration-key";
  pub const PASSWORD_RESET: &str = "password-reset";
  pub const EDIT: &str = "edit-key";
}

/// Password-reset links are valid for ten minutes.
pub const PASSWORD_RESET_MAX_AGE: TimeDelta = TimeDelta::seconds(600);

/// Personal-data edit links are valid for one day.
pub const EDIT_MAX_AGE: TimeDelta = TimeDelta::days(1);

/// Issues and verifies tokens with a process-wide secret.
///
/// Rotating the secret invalidates every outstanding token.
#[derive(Clone)]
pub struct TokenSigner {
  secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TokenSigner").finish_non_exhaustive()
  }
}

impl TokenSigner {
  pub fn new(secret: impl AsRef<[u8]>) -> Self {
    Self { secret: secret.as_ref().to_vec() }
  }

  /// Sign `payload` for `purpose`, stamped with the current time.
  pub fn issue<T: Serialize>(&self, payload: &T, purpose: &str) -> Result<String> {
    self.issue_at(payload, purpose, Utc::now())
  }

  /// Verify `token` for `purpose`. With `max_age`, tokens older than that
  /// are rejected.
  pub fn verify<T: DeserializeOwned>(
    &self,
    token: &str,
    purpose: &str,
    max_age: Option<TimeDelta>,
  ) -> Result<T> {
    self.verify_at(token, purpose, max_age, Utc::now())
  }

  /// [`issue`](Self::issue) with an explicit clock.
  pub fn issue_at<T: Serialize>(
    &self,
    payload: &T,
    purpose: &str,
    now: DateTime<Utc>,
  ) -> Result<String> {
    let body = B64.encode(serde_json::to_vec(payload)?);
    let stamp = B64.encode(now.timestamp().to_be_bytes());
    let signed = format!("{body}.{stamp}");
    let signature = B64.encode(self.mac(purpose, &signed).finalize().into_bytes());
    Ok(format!("{signed}.{signature}"))
  }

  /// [`verify`](Self::verify) with an explicit clock.
  pub fn verify_at<T: DeserializeOwned>(
    &self,
    token: &str,
    purpose: &str,
    max_age: Option<TimeDelta>,
    now: DateTime<Utc>,
  ) -> Result<T> {
    let (signed, signature) = token.rsplit_once('.').ok_or(Error::InvalidToken)?;
    let signature = B64.decode(signature).map_err(|_| Error::InvalidToken)?;
    self
      .mac(purpose, signed)
      .verify_slice(&signature)
      .map_err(|_| Error::InvalidToken)?;

    let (body, stamp) = signed.split_once('.').ok_or(Error::InvalidToken)?;
    let stamp: [u8; 8] = B64
      .decode(stamp)
      .ok()
      .and_then(|bytes| bytes.try_into().ok())
      .ok_or(Error::InvalidToken)?;
    let issued_at = i64::from_be_bytes(stamp);

    if let Some(max_age) = max_age {
      let age = now.timestamp() - issued_at;
      if age < 0 || age > max_age.num_seconds() {
        tracing::debug!(purpose, age, "token expired");
        return Err(Error::InvalidToken);
      }
    }

    let body = B64.decode(body).map_err(|_| Error::InvalidToken)?;
    serde_json::from_slice(&body).map_err(|_| Error::InvalidToken)
  }

  fn mac(&self, purpose: &str, signed: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(&self.secret)
      .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(purpose.as_bytes());
    mac.update(&[0]);
    mac.update(signed.as_bytes());
    mac
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn signer() -> TokenSigner { TokenSigner::new("test-secret") }

  #[test]
  fn roundtrip_tuple() {
    let s = signer();
    let token = s.issue(&(7_i64, 42_i64), purpose::REGISTRATION).unwrap();
    let payload: (i64, i64) = s.verify(&token, purpose::REGISTRATION, None).unwrap();
    assert_eq!(payload, (7, 42));
  }

  #[test]
  fn roundtrip_string() {
    let s = signer();
    let token = s.issue(&"ada@example.org", purpose::EDIT).unwrap();
    let payload: String = s.verify(&token, purpose::EDIT, None).unwrap();
    assert_eq!(payload, "ada@example.org");
  }

  #[test]
  fn token_is_url_safe() {
    let token = signer().issue(&(1_i64, 2_i64), purpose::REGISTRATION).unwrap();
    assert!(
      token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')),
      "{token}"
    );
  }

  #[test]
  fn other_purpose_is_rejected() {
    let s = signer();
    let token = s.issue(&(1_i64, 2_i64), purpose::REGISTRATION).unwrap();
    let err = s
      .verify::<(i64, i64)>(&token, purpose::PASSWORD_RESET, None)
      .unwrap_err();
    assert!(matches!(err, Error::InvalidToken));
  }

  #[test]
  fn other_secret_is_rejected() {
    let token = signer().issue(&(1_i64, 2_i64), purpose::REGISTRATION).unwrap();
    let err = TokenSigner::new("rotated")
      .verify::<(i64, i64)>(&token, purpose::REGISTRATION, None)
      .unwrap_err();
    assert!(matches!(err, Error::InvalidToken));
  }

  #[test]
  fn tampered_payload_is_rejected() {
    let s = signer();
    let token = s.issue(&(1_i64, 2_i64), purpose::REGISTRATION).unwrap();
    let forged_body = B64.encode(serde_json::to_vec(&(1_i64, 3_i64)).unwrap());
    let (_, rest) = token.split_once('.').unwrap();
    let forged = format!("{forged_body}.{rest}");
    assert!(matches!(
      s.verify::<(i64, i64)>(&forged, purpose::REGISTRATION, None),
      Err(Error::InvalidToken)
    ));
  }

  #[test]
  fn garbage_is_rejected() {
    let s = signer();
    for token in ["", "abc", "a.b", "a.b.c", "...."] {
      assert!(matches!(
        s.verify::<String>(token, purpose::EDIT, None),
        Err(Error::InvalidToken)
      ));
    }
  }

  #[test]
  fn max_age_boundary() {
    let s = signer();
    let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let token = s
      .issue_at(&"ada@example.org", purpose::PASSWORD_RESET, issued)
      .unwrap();

    let at = |secs| issued + TimeDelta::seconds(secs);
    let max_age = Some(PASSWORD_RESET_MAX_AGE);

    let ok: String = s
      .verify_at(&token, purpose::PASSWORD_RESET, max_age, at(599))
      .unwrap();
    assert_eq!(ok, "ada@example.org");

    assert!(matches!(
      s.verify_at::<String>(&token, purpose::PASSWORD_RESET, max_age, at(601)),
      Err(Error::InvalidToken)
    ));
  }

  #[test]
  fn no_max_age_never_expires() {
    let s = signer();
    let issued = Utc.timestamp_opt(1_000_000_000, 0).unwrap();
    let token = s.issue_at(&(1_i64, 2_i64), purpose::REGISTRATION, issued).unwrap();
    let later = issued + TimeDelta::days(3650);
    let payload: (i64, i64) = s
      .verify_at(&token, purpose::REGISTRATION, None, later)
      .unwrap();
    assert_eq!(payload, (1, 2));
  }
}
