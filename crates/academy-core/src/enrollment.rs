//! Enrollment records: one user's relationship to one cohort of a course.
//!
//! An enrollment is keyed deterministically from the payment that produced it,
//! so replaying a payment event resolves to the same document. At most one
//! enrollment per `(user_id, course_id)` may be `active` at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Status enums ────────────────────────────────────────────────────────────

/// Where an enrollment sits in its lifecycle.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnrollmentStatus {
  Pending,
  #[default]
  Active,
  Completed,
  Cancelled,
}

impl EnrollmentStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }
}

/// Settlement state of the payment behind an enrollment.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
  #[default]
  Pending,
  Paid,
  Failed,
  Refunded,
}

// ─── Enrollment ──────────────────────────────────────────────────────────────

/// A persisted enrollment document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
  /// Document key; see [`NewEnrollment::document_key`].
  pub enrollment_id:  String,
  pub user_id:        String,
  pub course_id:      String,
  pub cohort_id:      String,
  pub status:         EnrollmentStatus,
  pub payment_status: PaymentStatus,
  pub enrolled_at:    DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
  /// External payment reference (e.g. a checkout session id).
  pub payment_id:     Option<String>,
  /// External customer reference at the payment provider.
  pub customer_ref:   Option<String>,
  pub amount_cents:   Option<i64>,
  pub updated_at:     DateTime<Utc>,
}

// ─── NewEnrollment ───────────────────────────────────────────────────────────

/// Input to [`crate::store::EnrollmentStore::create_enrollment`].
/// `enrolled_at` is always set by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEnrollment {
  pub user_id:        String,
  pub course_id:      String,
  pub cohort_id:      String,
  pub payment_id:     Option<String>,
  pub payment_status: Option<PaymentStatus>,
  /// Defaults to [`EnrollmentStatus::Active`] when absent.
  pub status:         Option<EnrollmentStatus>,
  pub customer_ref:   Option<String>,
  pub amount_cents:   Option<i64>,
}

impl NewEnrollment {
  /// Convenience constructor with all optional fields unset.
  pub fn new(
    user_id: impl Into<String>,
    course_id: impl Into<String>,
    cohort_id: impl Into<String>,
  ) -> Self {
    Self {
      user_id: user_id.into(),
      course_id: course_id.into(),
      cohort_id: cohort_id.into(),
      ..Self::default()
    }
  }

  pub fn with_payment(mut self, payment_id: impl Into<String>) -> Self {
    self.payment_id = Some(payment_id.into());
    self
  }

  pub fn with_status(mut self, status: EnrollmentStatus) -> Self {
    self.status = Some(status);
    self
  }

  /// Reject inputs with a missing or blank required identifier, or one that
  /// would start in a terminal status. New enrollments are pending or active.
  pub fn validate(&self) -> Result<()> {
    let status = self.effective_status();
    if !matches!(status, EnrollmentStatus::Pending | EnrollmentStatus::Active) {
      return Err(Error::Validation(format!(
        "enrollments cannot be created as {status}"
      )));
    }

    let required = [
      ("user_id", &self.user_id),
      ("course_id", &self.course_id),
      ("cohort_id", &self.cohort_id),
    ];
    let missing: Vec<&str> = required
      .iter()
      .filter(|(_, v)| v.trim().is_empty())
      .map(|(name, _)| *name)
      .collect();

    if missing.is_empty() {
      Ok(())
    } else {
      Err(Error::Validation(format!(
        "missing required fields: {}",
        missing.join(", ")
      )))
    }
  }

  /// The document key this enrollment is stored under.
  ///
  /// Payment-backed enrollments get a key derived only from the payment id,
  /// which is what makes replays of the same payment land on one document.
  pub fn document_key(&self, now: DateTime<Utc>) -> String {
    match self.payment_id.as_deref().map(str::trim) {
      Some(pid) if !pid.is_empty() => format!("payment_{pid}"),
      _ => format!(
        "enrollment_{}_{}_{}",
        self.user_id,
        self.course_id,
        now.timestamp_millis()
      ),
    }
  }

  pub fn effective_status(&self) -> EnrollmentStatus {
    self.status.unwrap_or_default()
  }
}

/// Result of a create call: the document id and whether it was written now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
  pub enrollment_id: String,
  pub created:       bool,
}

/// What the creation transaction resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
  Created(String),
  /// An existing document was found, either at the same key or as the
  /// user's active enrollment in the course.
  Existing(String),
  /// The cohort to increment does not exist; nothing was written.
  CohortNotFound(String),
}

// ─── Updates ─────────────────────────────────────────────────────────────────

/// A partial update; only `Some` fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrollmentUpdate {
  pub status:         Option<EnrollmentStatus>,
  pub payment_status: Option<PaymentStatus>,
  pub completed_at:   Option<DateTime<Utc>>,
  pub payment_id:     Option<String>,
  pub customer_ref:   Option<String>,
}

impl EnrollmentUpdate {
  pub fn is_empty(&self) -> bool {
    self.status.is_none()
      && self.payment_status.is_none()
      && self.completed_at.is_none()
      && self.payment_id.is_none()
      && self.customer_ref.is_none()
  }
}

/// What a reactivation attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reactivation {
  Reactivated(Enrollment),
  /// The enrollment was already active; nothing was written.
  AlreadyActive(Enrollment),
  /// Another enrollment for the same user and course is active.
  Conflict { active_enrollment_id: String },
  NotFound,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Equality filters over the `enrollments` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentQuery {
  All,
  User(String),
  Cohort(String),
  Course(String),
  Status(EnrollmentStatus),
}

impl EnrollmentQuery {
  /// Whether `enrollment` belongs to this query's result set.
  pub fn matches(&self, enrollment: &Enrollment) -> bool {
    match self {
      Self::All => true,
      Self::User(id) => &enrollment.user_id == id,
      Self::Cohort(id) => &enrollment.cohort_id == id,
      Self::Course(id) => &enrollment.course_id == id,
      Self::Status(s) => enrollment.status == *s,
    }
  }
}
