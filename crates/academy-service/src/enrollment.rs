//! [`EnrollmentManager`]: the single authority for creating and changing
//! enrollment records.
//!
//! Creation is delegated to the store's transactional
//! [`create_enrollment`](EnrollmentStore::create_enrollment); the manager
//! validates input, maps the outcome onto the service error taxonomy, and
//! fans the change out to the progress cache and to subscribers.

use std::sync::Arc;

use academy_core::{
  cohort::Cohort,
  enrollment::{
    Creation, Enrollment, EnrollmentOutcome, EnrollmentQuery, EnrollmentStatus,
    EnrollmentUpdate, NewEnrollment, PaymentStatus, Reactivation,
  },
  store::{EnrollmentStore, ProgressStore},
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{
  Error, Result,
  cache::{InvalidationReason, ProgressCache},
  subscription::{EnrollmentChange, EnrollmentSubscription},
};

/// Capacity of the change channel. A subscriber that falls further behind
/// than this refetches instead of replaying.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A completed checkout, as reported by the payment provider's webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCompleted {
  pub payment_id:   String,
  pub user_id:      String,
  pub course_id:    String,
  pub cohort_id:    String,
  pub amount_cents: i64,
  #[serde(default)]
  pub customer_ref: Option<String>,
}

impl From<PaymentCompleted> for NewEnrollment {
  fn from(payment: PaymentCompleted) -> Self {
    Self {
      user_id:        payment.user_id,
      course_id:      payment.course_id,
      cohort_id:      payment.cohort_id,
      payment_id:     Some(payment.payment_id),
      payment_status: Some(PaymentStatus::Paid),
      status:         Some(EnrollmentStatus::Active),
      customer_ref:   payment.customer_ref,
      amount_cents:   Some(payment.amount_cents),
    }
  }
}

pub struct EnrollmentManager<S> {
  store:   Arc<S>,
  cache:   ProgressCache<S>,
  changes: broadcast::Sender<EnrollmentChange>,
}

impl<S> Clone for EnrollmentManager<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      cache:   self.cache.clone(),
      changes: self.changes.clone(),
    }
  }
}

impl<S> EnrollmentManager<S>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  pub fn new(store: Arc<S>, cache: ProgressCache<S>) -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    Self { store, cache, changes }
  }

  pub fn cache(&self) -> &ProgressCache<S> { &self.cache }

  // ── Creation ──────────────────────────────────────────────────────────────

  /// Create an enrollment, or return the one that already satisfies the
  /// request.
  ///
  /// `created` is `false` when a document already existed under the same
  /// payment id, or when the user already holds an active enrollment in the
  /// course. Only a newly written document invalidates the user's progress
  /// and notifies subscribers.
  pub async fn create_enrollment(&self, input: NewEnrollment) -> Result<EnrollmentOutcome> {
    input.validate()?;
    let user_id = input.user_id.clone();

    let creation = self
      .store
      .create_enrollment(input)
      .await
      .map_err(Error::persistence)?;

    match creation {
      Creation::Created(enrollment_id) => {
        tracing::info!(%enrollment_id, %user_id, "enrollment created");
        self
          .changed(&enrollment_id, &user_id, InvalidationReason::EnrollmentChanged)
          .await;
        Ok(EnrollmentOutcome { enrollment_id, created: true })
      }
      Creation::Existing(enrollment_id) => {
        tracing::debug!(%enrollment_id, %user_id, "enrollment already exists");
        Ok(EnrollmentOutcome { enrollment_id, created: false })
      }
      Creation::CohortNotFound(cohort_id) => Err(Error::not_found("cohort", &cohort_id)),
    }
  }

  /// Enroll the paying user. Replays of the same payment resolve to the
  /// document created by the first delivery.
  pub async fn handle_payment_success(
    &self,
    payment: PaymentCompleted,
  ) -> Result<EnrollmentOutcome> {
    let payment_id = payment.payment_id.clone();
    let outcome = self.create_enrollment(payment.into()).await?;
    if !outcome.created {
      tracing::info!(
        %payment_id,
        enrollment_id = %outcome.enrollment_id,
        "payment already enrolled"
      );
    }
    Ok(outcome)
  }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Apply the supplied fields. Cohort seat counters are never touched, so a
  /// cancelled enrollment keeps its seat.
  ///
  /// Setting the status to active goes through
  /// [`reactivate_enrollment`](Self::reactivate_enrollment) first, so it
  /// fails with [`Error::Conflict`] under the same conditions.
  pub async fn update_enrollment(
    &self,
    enrollment_id: &str,
    mut update: EnrollmentUpdate,
  ) -> Result<Enrollment> {
    if update.status.is_some_and(EnrollmentStatus::is_active) {
      let reactivated = self.reactivate_enrollment(enrollment_id).await?;
      update.status = None;
      if update.is_empty() {
        return Ok(reactivated);
      }
    }

    let updated = self
      .store
      .update_enrollment(enrollment_id, update)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::not_found("enrollment", enrollment_id))?;

    self
      .changed(enrollment_id, &updated.user_id, InvalidationReason::EnrollmentChanged)
      .await;
    Ok(updated)
  }

  pub async fn complete_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
    let update = EnrollmentUpdate {
      status: Some(EnrollmentStatus::Completed),
      completed_at: Some(Utc::now()),
      ..EnrollmentUpdate::default()
    };
    self.update_enrollment(enrollment_id, update).await
  }

  pub async fn cancel_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
    let update = EnrollmentUpdate {
      status: Some(EnrollmentStatus::Cancelled),
      ..EnrollmentUpdate::default()
    };
    self.update_enrollment(enrollment_id, update).await
  }

  /// Make an enrollment active again. Fails with [`Error::Conflict`] when the
  /// user already has a different active enrollment in the same course.
  pub async fn reactivate_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
    let reactivation = self
      .store
      .reactivate_enrollment(enrollment_id)
      .await
      .map_err(Error::persistence)?;

    match reactivation {
      Reactivation::Reactivated(enrollment) => {
        tracing::info!(enrollment_id, user_id = %enrollment.user_id, "enrollment reactivated");
        self
          .changed(enrollment_id, &enrollment.user_id, InvalidationReason::EnrollmentChanged)
          .await;
        Ok(enrollment)
      }
      Reactivation::AlreadyActive(enrollment) => Ok(enrollment),
      Reactivation::Conflict { active_enrollment_id } => Err(Error::Conflict(format!(
        "enrollment {active_enrollment_id} is already active for this user and course"
      ))),
      Reactivation::NotFound => Err(Error::not_found("enrollment", enrollment_id)),
    }
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  pub async fn get_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
    self
      .store
      .get_enrollment(enrollment_id)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::not_found("enrollment", enrollment_id))
  }

  /// Enrollments matching `query`, newest first.
  pub async fn list(&self, query: &EnrollmentQuery) -> Result<Vec<Enrollment>> {
    self
      .store
      .list_enrollments(query)
      .await
      .map_err(Error::persistence)
  }

  pub async fn user_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>> {
    self.list(&EnrollmentQuery::User(user_id.to_owned())).await
  }

  pub async fn cohort_enrollments(&self, cohort_id: &str) -> Result<Vec<Enrollment>> {
    self.list(&EnrollmentQuery::Cohort(cohort_id.to_owned())).await
  }

  pub async fn course_enrollments(&self, course_id: &str) -> Result<Vec<Enrollment>> {
    self.list(&EnrollmentQuery::Course(course_id.to_owned())).await
  }

  pub async fn enrollments_with_status(
    &self,
    status: EnrollmentStatus,
  ) -> Result<Vec<Enrollment>> {
    self.list(&EnrollmentQuery::Status(status)).await
  }

  /// The user's active enrollment in a course, read straight from the store.
  pub async fn active_enrollment(
    &self,
    user_id: &str,
    course_id: &str,
  ) -> Result<Option<Enrollment>> {
    self
      .store
      .find_active_enrollment(user_id, course_id)
      .await
      .map_err(Error::persistence)
  }

  pub async fn get_cohort(&self, cohort_id: &str) -> Result<Cohort> {
    self
      .store
      .get_cohort(cohort_id)
      .await
      .map_err(Error::persistence)?
      .ok_or_else(|| Error::not_found("cohort", cohort_id))
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  /// Watch the result set of `query`. The subscription yields the full set
  /// once straight away and again after every enrollment mutation that can
  /// affect it.
  pub fn subscribe(&self, query: EnrollmentQuery) -> EnrollmentSubscription<S> {
    EnrollmentSubscription::new(Arc::clone(&self.store), query, self.changes.subscribe())
  }

  async fn changed(&self, enrollment_id: &str, user_id: &str, reason: InvalidationReason) {
    self.cache.invalidate(user_id, reason).await;
    // Err only means nobody is subscribed.
    let _ = self.changes.send(EnrollmentChange {
      enrollment_id: enrollment_id.to_owned(),
      user_id:       user_id.to_owned(),
    });
  }
}
