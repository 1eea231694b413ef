//! [`SqliteStore`]: the SQLite implementation of the academy store traits.

use std::path::Path;

use academy_core::{
  achievement::{Achievement, AchievementKind},
  cohort::Cohort,
  course::Lesson,
  enrollment::{
    Creation, Enrollment, EnrollmentQuery, EnrollmentUpdate, NewEnrollment,
    Reactivation,
  },
  progress::{CachedProgress, LessonProgress},
  store::{EnrollmentStore, ProgressStore},
};
use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    COHORT_COLUMNS, ENROLLMENT_COLUMNS, LESSON_COLUMNS, PROGRESS_COLUMNS,
    RawAchievement, RawCohort, RawEnrollment, RawLessonProgress, encode_coupons,
    encode_dt, encode_pricing, lesson_from_row,
  },
  schema::SCHEMA,
};

const ACTIVE: &str = "active";

/// Outcome of the reactivation transaction, before the record is re-read.
enum ReactivationStep {
  NotFound,
  AlreadyActive,
  Conflict(String),
  Reactivated,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An academy store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the connection; tests use this to plant rows in
  /// shapes the typed writers never produce.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_enrollments(
    &self,
    where_clause: &'static str,
    param: Option<String>,
  ) -> Result<Vec<Enrollment>> {
    let raws: Vec<RawEnrollment> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ENROLLMENT_COLUMNS} FROM enrollments {where_clause}
           ORDER BY enrolled_at DESC, enrollment_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(param.iter()), RawEnrollment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEnrollment::into_enrollment).collect()
  }
}

// ─── EnrollmentStore impl ────────────────────────────────────────────────────

impl EnrollmentStore for SqliteStore {
  type Error = crate::Error;

  async fn create_enrollment(&self, input: NewEnrollment) -> Result<Creation> {
    let now = Utc::now();
    let key = input.document_key(now);
    let status = input.effective_status();
    let payment_status = input.payment_status.unwrap_or_default();

    let is_active = status.is_active();
    let status_str = status.as_ref().to_owned();
    let payment_status_str = payment_status.as_ref().to_owned();
    let now_str = encode_dt(now);

    let creation = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front so two creators cannot both
        // pass the uniqueness reads below.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let at_key: Option<String> = tx
          .query_row(
            "SELECT enrollment_id FROM enrollments WHERE enrollment_id = ?1",
            rusqlite::params![key],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(id) = at_key {
          return Ok(Creation::Existing(id));
        }

        let active: Option<String> = tx
          .query_row(
            "SELECT enrollment_id FROM enrollments
             WHERE user_id = ?1 AND course_id = ?2 AND status = ?3
             ORDER BY enrolled_at DESC LIMIT 1",
            rusqlite::params![input.user_id, input.course_id, ACTIVE],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(id) = active {
          return Ok(Creation::Existing(id));
        }

        tx.execute(
          "INSERT INTO enrollments (
             enrollment_id, user_id, course_id, cohort_id, status, payment_status,
             enrolled_at, completed_at, payment_id, customer_ref, amount_cents,
             updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9, ?10, ?7)",
          rusqlite::params![
            key,
            input.user_id,
            input.course_id,
            input.cohort_id,
            status_str,
            payment_status_str,
            now_str,
            input.payment_id,
            input.customer_ref,
            input.amount_cents,
          ],
        )?;

        if is_active {
          let current: Option<i64> = tx
            .query_row(
              "SELECT current_students FROM cohorts WHERE cohort_id = ?1",
              rusqlite::params![input.cohort_id],
              |r| r.get(0),
            )
            .optional()?;
          // Dropping `tx` without commit rolls the insert back.
          let Some(current) = current else {
            return Ok(Creation::CohortNotFound(input.cohort_id));
          };
          tx.execute(
            "UPDATE cohorts SET current_students = ?2 WHERE cohort_id = ?1",
            rusqlite::params![input.cohort_id, (current + 1).max(0)],
          )?;
        }

        tx.commit()?;
        Ok(Creation::Created(key))
      })
      .await?;

    tracing::debug!(?creation, "enrollment creation transaction finished");
    Ok(creation)
  }

  async fn get_enrollment(&self, enrollment_id: &str) -> Result<Option<Enrollment>> {
    let id = enrollment_id.to_owned();

    let raw: Option<RawEnrollment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE enrollment_id = ?1"),
              rusqlite::params![id],
              RawEnrollment::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEnrollment::into_enrollment).transpose()
  }

  async fn update_enrollment(
    &self,
    enrollment_id: &str,
    update: EnrollmentUpdate,
  ) -> Result<Option<Enrollment>> {
    let id = enrollment_id.to_owned();
    let status = update.status.map(|s| s.as_ref().to_owned());
    let payment_status = update.payment_status.map(|s| s.as_ref().to_owned());
    let completed_at = update.completed_at.map(encode_dt);
    let now_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE enrollments SET
             status         = COALESCE(?2, status),
             payment_status = COALESCE(?3, payment_status),
             completed_at   = COALESCE(?4, completed_at),
             payment_id     = COALESCE(?5, payment_id),
             customer_ref   = COALESCE(?6, customer_ref),
             updated_at     = ?7
           WHERE enrollment_id = ?1",
          rusqlite::params![
            id,
            status,
            payment_status,
            completed_at,
            update.payment_id,
            update.customer_ref,
            now_str,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.get_enrollment(enrollment_id).await
  }

  async fn reactivate_enrollment(&self, enrollment_id: &str) -> Result<Reactivation> {
    let id = enrollment_id.to_owned();
    let now_str = encode_dt(Utc::now());

    let step = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, String, String)> = tx
          .query_row(
            "SELECT user_id, course_id, status FROM enrollments WHERE enrollment_id = ?1",
            rusqlite::params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;
        let Some((user_id, course_id, status)) = row else {
          return Ok(ReactivationStep::NotFound);
        };
        if status == ACTIVE {
          return Ok(ReactivationStep::AlreadyActive);
        }

        let other: Option<String> = tx
          .query_row(
            "SELECT enrollment_id FROM enrollments
             WHERE user_id = ?1 AND course_id = ?2 AND status = ?3
               AND enrollment_id != ?4
             LIMIT 1",
            rusqlite::params![user_id, course_id, ACTIVE, id],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(other) = other {
          return Ok(ReactivationStep::Conflict(other));
        }

        tx.execute(
          "UPDATE enrollments SET status = ?2, updated_at = ?3 WHERE enrollment_id = ?1",
          rusqlite::params![id, ACTIVE, now_str],
        )?;
        tx.commit()?;
        Ok(ReactivationStep::Reactivated)
      })
      .await?;

    let reread = |e: Option<Enrollment>, wrap: fn(Enrollment) -> Reactivation| {
      e.map_or(Reactivation::NotFound, wrap)
    };

    Ok(match step {
      ReactivationStep::NotFound => Reactivation::NotFound,
      ReactivationStep::Conflict(active_enrollment_id) => {
        Reactivation::Conflict { active_enrollment_id }
      }
      ReactivationStep::AlreadyActive => reread(
        self.get_enrollment(enrollment_id).await?,
        Reactivation::AlreadyActive,
      ),
      ReactivationStep::Reactivated => reread(
        self.get_enrollment(enrollment_id).await?,
        Reactivation::Reactivated,
      ),
    })
  }

  async fn find_active_enrollment(
    &self,
    user_id: &str,
    course_id: &str,
  ) -> Result<Option<Enrollment>> {
    let user_id = user_id.to_owned();
    let course_id = course_id.to_owned();

    let raw: Option<RawEnrollment> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
                 WHERE user_id = ?1 AND course_id = ?2 AND status = ?3
                 ORDER BY enrolled_at DESC LIMIT 1"
              ),
              rusqlite::params![user_id, course_id, ACTIVE],
              RawEnrollment::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEnrollment::into_enrollment).transpose()
  }

  async fn list_enrollments(&self, query: &EnrollmentQuery) -> Result<Vec<Enrollment>> {
    let (where_clause, param) = match query {
      EnrollmentQuery::All => ("", None),
      EnrollmentQuery::User(id) => ("WHERE user_id = ?1", Some(id.clone())),
      EnrollmentQuery::Cohort(id) => ("WHERE cohort_id = ?1", Some(id.clone())),
      EnrollmentQuery::Course(id) => ("WHERE course_id = ?1", Some(id.clone())),
      EnrollmentQuery::Status(s) => ("WHERE status = ?1", Some(s.as_ref().to_owned())),
    };
    self.query_enrollments(where_clause, param).await
  }

  async fn put_cohort(&self, cohort: Cohort) -> Result<()> {
    let pricing_json = encode_pricing(&cohort.pricing)?;
    let coupons_json = encode_coupons(&cohort.coupons)?;
    let start = encode_dt(cohort.start_date);
    let end = encode_dt(cohort.end_date);
    let status = cohort.status.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO cohorts (
             cohort_id, course_id, name, start_date, end_date,
             max_students, current_students, status, pricing_json, coupons_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            cohort.cohort_id,
            cohort.course_id,
            cohort.name,
            start,
            end,
            cohort.max_students,
            cohort.current_students,
            status,
            pricing_json,
            coupons_json,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_cohort(&self, cohort_id: &str) -> Result<Option<Cohort>> {
    let id = cohort_id.to_owned();

    let raw: Option<RawCohort> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {COHORT_COLUMNS} FROM cohorts WHERE cohort_id = ?1"),
              rusqlite::params![id],
              RawCohort::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCohort::into_cohort).transpose()
  }
}

// ─── ProgressStore impl ──────────────────────────────────────────────────────

impl ProgressStore for SqliteStore {
  type Error = crate::Error;

  async fn load_user_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>> {
    self
      .query_enrollments("WHERE user_id = ?1", Some(user_id.to_owned()))
      .await
  }

  async fn load_cohort(&self, cohort_id: &str) -> Result<Option<Cohort>> {
    self.get_cohort(cohort_id).await
  }

  async fn load_course_lessons(&self, course_id: &str) -> Result<Vec<Lesson>> {
    let id = course_id.to_owned();

    let lessons = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1
           ORDER BY lesson_order, lesson_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], lesson_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(lessons)
  }

  async fn load_lesson_progress(&self, user_id: &str) -> Result<Vec<LessonProgress>> {
    let id = user_id.to_owned();

    let raws: Vec<RawLessonProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawLessonProgress::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLessonProgress::into_progress).collect()
  }

  async fn load_achievements(&self, user_id: &str) -> Result<Vec<Achievement>> {
    let id = user_id.to_owned();

    let raws: Vec<RawAchievement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT achievement_id, user_id, kind, awarded_at FROM user_achievements
           WHERE user_id = ?1 ORDER BY awarded_at DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], RawAchievement::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAchievement::into_achievement).collect()
  }

  async fn load_cached_progress(&self, user_id: &str) -> Result<Option<CachedProgress>> {
    let id = user_id.to_owned();

    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT cached_progress FROM user_profiles WHERE user_id = ?1",
              rusqlite::params![id],
              |r| r.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten(),
        )
      })
      .await?;

    Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
  }

  async fn save_cached_progress(&self, progress: &CachedProgress) -> Result<()> {
    let id = progress.user_id.clone();
    let json = serde_json::to_string(progress)?;
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO user_profiles (user_id, cached_progress, updated_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(user_id) DO UPDATE SET
             cached_progress = excluded.cached_progress,
             updated_at      = excluded.updated_at",
          rusqlite::params![id, json, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_lesson_progress(&self, record: LessonProgress) -> Result<()> {
    let completed_at = record.completed_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO lesson_progress (
             user_id, lesson_id, course_id, completed, completed_at, watched_percentage
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            record.user_id,
            record.lesson_id,
            record.course_id,
            record.completed,
            completed_at,
            record.watched_percentage,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn save_lesson(&self, lesson: Lesson) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO lessons (
             lesson_id, course_id, title, lesson_order, duration_minutes
           ) VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            lesson.lesson_id,
            lesson.course_id,
            lesson.title,
            lesson.order,
            lesson.duration_minutes,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn award_achievement(
    &self,
    user_id: &str,
    kind: AchievementKind,
  ) -> Result<Option<Achievement>> {
    let achievement = Achievement {
      achievement_id: Uuid::new_v4().to_string(),
      user_id: user_id.to_owned(),
      kind,
      awarded_at: Utc::now(),
    };

    let id = achievement.achievement_id.clone();
    let user = achievement.user_id.clone();
    let kind_str = kind.as_ref().to_owned();
    let at_str = encode_dt(achievement.awarded_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO user_achievements (achievement_id, user_id, kind, awarded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id, user, kind_str, at_str],
        )?)
      })
      .await?;

    Ok((inserted == 1).then_some(achievement))
  }
}
