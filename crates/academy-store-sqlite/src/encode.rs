//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Status enums use their `strum`
//! string forms. Cohort pricing and coupons are stored as JSON; coupon dates
//! are normalised from [`TimestampRepr`](academy_core::timestamp::TimestampRepr)
//! here, so nothing above the store ever sees the raw forms.

use academy_core::{
  achievement::{Achievement, AchievementKind},
  cohort::{Cohort, CohortStatus, Coupon, Pricing, RawCoupon},
  course::Lesson,
  enrollment::{Enrollment, EnrollmentStatus, PaymentStatus},
  error::parse_variant,
  progress::LessonProgress,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Cohort sub-documents ────────────────────────────────────────────────────

pub fn encode_pricing(p: &Pricing) -> Result<String> { Ok(serde_json::to_string(p)?) }

pub fn encode_coupons(c: &[Coupon]) -> Result<String> { Ok(serde_json::to_string(c)?) }

/// Decode the stored coupon array, normalising every validity date.
pub fn decode_coupons(s: &str) -> Result<Vec<Coupon>> {
  let raws: Vec<RawCoupon> = serde_json::from_str(s)?;
  Ok(
    raws
      .into_iter()
      .map(RawCoupon::normalize)
      .collect::<academy_core::Result<_>>()?,
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawEnrollment::from_row`].
pub const ENROLLMENT_COLUMNS: &str = "enrollment_id, user_id, course_id, cohort_id, \
   status, payment_status, enrolled_at, completed_at, payment_id, customer_ref, \
   amount_cents, updated_at";

/// Raw values read directly from an `enrollments` row.
pub struct RawEnrollment {
  pub enrollment_id:  String,
  pub user_id:        String,
  pub course_id:      String,
  pub cohort_id:      String,
  pub status:         String,
  pub payment_status: String,
  pub enrolled_at:    String,
  pub completed_at:   Option<String>,
  pub payment_id:     Option<String>,
  pub customer_ref:   Option<String>,
  pub amount_cents:   Option<i64>,
  pub updated_at:     String,
}

impl RawEnrollment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      enrollment_id:  row.get(0)?,
      user_id:        row.get(1)?,
      course_id:      row.get(2)?,
      cohort_id:      row.get(3)?,
      status:         row.get(4)?,
      payment_status: row.get(5)?,
      enrolled_at:    row.get(6)?,
      completed_at:   row.get(7)?,
      payment_id:     row.get(8)?,
      customer_ref:   row.get(9)?,
      amount_cents:   row.get(10)?,
      updated_at:     row.get(11)?,
    })
  }

  pub fn into_enrollment(self) -> Result<Enrollment> {
    Ok(Enrollment {
      enrollment_id:  self.enrollment_id,
      user_id:        self.user_id,
      course_id:      self.course_id,
      cohort_id:      self.cohort_id,
      status:         parse_variant::<EnrollmentStatus>("enrollment status", &self.status)?,
      payment_status: parse_variant::<PaymentStatus>("payment status", &self.payment_status)?,
      enrolled_at:    decode_dt(&self.enrolled_at)?,
      completed_at:   decode_opt_dt(self.completed_at.as_deref())?,
      payment_id:     self.payment_id,
      customer_ref:   self.customer_ref,
      amount_cents:   self.amount_cents,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const COHORT_COLUMNS: &str = "cohort_id, course_id, name, start_date, end_date, \
   max_students, current_students, status, pricing_json, coupons_json";

/// Raw values read directly from a `cohorts` row.
pub struct RawCohort {
  pub cohort_id:        String,
  pub course_id:        String,
  pub name:             String,
  pub start_date:       String,
  pub end_date:         String,
  pub max_students:     i64,
  pub current_students: i64,
  pub status:           String,
  pub pricing_json:     String,
  pub coupons_json:     String,
}

impl RawCohort {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      cohort_id:        row.get(0)?,
      course_id:        row.get(1)?,
      name:             row.get(2)?,
      start_date:       row.get(3)?,
      end_date:         row.get(4)?,
      max_students:     row.get(5)?,
      current_students: row.get(6)?,
      status:           row.get(7)?,
      pricing_json:     row.get(8)?,
      coupons_json:     row.get(9)?,
    })
  }

  pub fn into_cohort(self) -> Result<Cohort> {
    Ok(Cohort {
      cohort_id:        self.cohort_id,
      course_id:        self.course_id,
      name:             self.name,
      start_date:       decode_dt(&self.start_date)?,
      end_date:         decode_dt(&self.end_date)?,
      max_students:     clamp_u32(self.max_students),
      current_students: clamp_u32(self.current_students),
      status:           parse_variant::<CohortStatus>("cohort status", &self.status)?,
      pricing:          serde_json::from_str(&self.pricing_json)?,
      coupons:          decode_coupons(&self.coupons_json)?,
    })
  }
}

pub const LESSON_COLUMNS: &str = "lesson_id, course_id, title, lesson_order, duration_minutes";

pub fn lesson_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
  Ok(Lesson {
    lesson_id:        row.get(0)?,
    course_id:        row.get(1)?,
    title:            row.get(2)?,
    order:            row.get(3)?,
    duration_minutes: row.get(4)?,
  })
}

pub const PROGRESS_COLUMNS: &str =
  "user_id, lesson_id, course_id, completed, completed_at, watched_percentage";

/// Raw values read directly from a `lesson_progress` row.
pub struct RawLessonProgress {
  pub user_id:            String,
  pub lesson_id:          String,
  pub course_id:          String,
  pub completed:          bool,
  pub completed_at:       Option<String>,
  pub watched_percentage: f64,
}

impl RawLessonProgress {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:            row.get(0)?,
      lesson_id:          row.get(1)?,
      course_id:          row.get(2)?,
      completed:          row.get(3)?,
      completed_at:       row.get(4)?,
      watched_percentage: row.get(5)?,
    })
  }

  pub fn into_progress(self) -> Result<LessonProgress> {
    Ok(LessonProgress {
      user_id:            self.user_id,
      lesson_id:          self.lesson_id,
      course_id:          self.course_id,
      completed:          self.completed,
      completed_at:       decode_opt_dt(self.completed_at.as_deref())?,
      watched_percentage: self.watched_percentage,
    })
  }
}

/// Raw values read directly from a `user_achievements` row.
pub struct RawAchievement {
  pub achievement_id: String,
  pub user_id:        String,
  pub kind:           String,
  pub awarded_at:     String,
}

impl RawAchievement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      achievement_id: row.get(0)?,
      user_id:        row.get(1)?,
      kind:           row.get(2)?,
      awarded_at:     row.get(3)?,
    })
  }

  pub fn into_achievement(self) -> Result<Achievement> {
    Ok(Achievement {
      achievement_id: self.achievement_id,
      user_id:        self.user_id,
      kind:           parse_variant::<AchievementKind>("achievement kind", &self.kind)?,
      awarded_at:     decode_dt(&self.awarded_at)?,
    })
  }
}

fn clamp_u32(n: i64) -> u32 { u32::try_from(n.max(0)).unwrap_or(u32::MAX) }
