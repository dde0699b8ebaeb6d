//! Persons: the long-lived identity anchor, keyed externally by email.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Database-assigned row id of a [`Person`].
pub type PersonId = i64;

/// An identity record. Login capability lives separately on a
/// [`User`](crate::user::User).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  pub id:              PersonId,
  pub name:            String,
  /// Unique across all persons.
  pub email:           String,
  /// Membership has been applied for.
  pub member:          bool,
  /// The board approved the membership application.
  pub member_approved: bool,
  pub date_of_birth:   Option<NaiveDate>,
  pub joining_date:    Option<NaiveDate>,
}

impl Person {
  /// A member in the full sense: applied and approved.
  pub fn is_member(&self) -> bool { self.member && self.member_approved }
}

/// Input to [`crate::store::MemberStore::insert_person`].
#[derive(Debug, Clone)]
pub struct NewPerson {
  pub name:   String,
  pub email:  String,
  pub member: bool,
}

impl NewPerson {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self { name: name.into(), email: email.into(), member: false }
  }
}

/// Filter for [`crate::store::MemberStore::list_persons`]. `None` matches
/// any value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonFilter {
  pub member:          Option<bool>,
  pub member_approved: Option<bool>,
}

impl PersonFilter {
  /// Approved members.
  pub fn members() -> Self {
    Self { member: Some(true), member_approved: Some(true) }
  }

  /// Membership applications still waiting for approval.
  pub fn applications() -> Self {
    Self { member: Some(true), member_approved: Some(false) }
  }

  pub fn matches(&self, person: &Person) -> bool {
    self.member.is_none_or(|m| m == person.member)
      && self.member_approved.is_none_or(|a| a == person.member_approved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn person(member: bool, member_approved: bool) -> Person {
    Person {
      id: 1,
      name: "Ada".into(),
      email: "ada@example.org".into(),
      member,
      member_approved,
      date_of_birth: None,
      joining_date: None,
    }
  }

  #[test]
  fn member_requires_approval() {
    assert!(!person(true, false).is_member());
    assert!(person(true, true).is_member());
  }

  #[test]
  fn filters() {
    assert!(PersonFilter::default().matches(&person(false, false)));
    assert!(PersonFilter::applications().matches(&person(true, false)));
    assert!(!PersonFilter::applications().matches(&person(true, true)));
    assert!(PersonFilter::members().matches(&person(true, true)));
  }
}
