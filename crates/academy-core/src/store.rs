//! The store traits implemented by storage backends.
//!
//! Backends (e.g. `academy-store-sqlite`) implement both traits. Higher layers
//! depend on these abstractions, never on a concrete backend. The split keeps
//! the progress cache's read set small enough to wrap in tests.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use crate::{
  achievement::{Achievement, AchievementKind},
  cohort::Cohort,
  course::Lesson,
  enrollment::{
    Creation, Enrollment, EnrollmentQuery, EnrollmentUpdate, NewEnrollment,
    Reactivation,
  },
  progress::{CachedProgress, LessonProgress},
};

// ─── Enrollments ─────────────────────────────────────────────────────────────

/// Sole writer of enrollment documents and cohort seat counters.
pub trait EnrollmentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create an enrollment, or resolve to an existing one, atomically.
  ///
  /// Within one transaction: an existing document at the input's
  /// [`document_key`](NewEnrollment::document_key) is returned as-is; else an
  /// existing active enrollment for the same user and course is returned;
  /// else a new document is written and, when it is active, the cohort's
  /// `current_students` is incremented.
  ///
  /// The input is assumed to be validated by the caller.
  fn create_enrollment(
    &self,
    input: NewEnrollment,
  ) -> impl Future<Output = Result<Creation, Self::Error>> + Send + '_;

  /// Retrieve an enrollment by document key. Returns `None` if not found.
  fn get_enrollment<'a>(
    &'a self,
    enrollment_id: &'a str,
  ) -> impl Future<Output = Result<Option<Enrollment>, Self::Error>> + Send + 'a;

  /// Apply a partial update. Returns the updated record, or `None` if the
  /// enrollment does not exist. Cohort counters are not touched.
  fn update_enrollment<'a>(
    &'a self,
    enrollment_id: &'a str,
    update: EnrollmentUpdate,
  ) -> impl Future<Output = Result<Option<Enrollment>, Self::Error>> + Send + 'a;

  /// Set an enrollment back to `active`, re-checking active uniqueness for its
  /// user and course in the same transaction.
  fn reactivate_enrollment<'a>(
    &'a self,
    enrollment_id: &'a str,
  ) -> impl Future<Output = Result<Reactivation, Self::Error>> + Send + 'a;

  /// The active enrollment for `(user_id, course_id)`, if any.
  fn find_active_enrollment<'a>(
    &'a self,
    user_id: &'a str,
    course_id: &'a str,
  ) -> impl Future<Output = Result<Option<Enrollment>, Self::Error>> + Send + 'a;

  /// All enrollments matching `query`, newest first.
  fn list_enrollments<'a>(
    &'a self,
    query: &'a EnrollmentQuery,
  ) -> impl Future<Output = Result<Vec<Enrollment>, Self::Error>> + Send + 'a;

  /// Insert or replace a cohort document.
  fn put_cohort(
    &self,
    cohort: Cohort,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Retrieve a cohort by id. Returns `None` if not found.
  fn get_cohort<'a>(
    &'a self,
    cohort_id: &'a str,
  ) -> impl Future<Output = Result<Option<Cohort>, Self::Error>> + Send + 'a;
}

// ─── Progress ────────────────────────────────────────────────────────────────

/// Everything the progress cache reads, plus its own persistence target and
/// the lesson-progress and achievement writers.
pub trait ProgressStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// All of a user's enrollments, any status.
  fn load_user_enrollments<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Enrollment>, Self::Error>> + Send + 'a;

  fn load_cohort<'a>(
    &'a self,
    cohort_id: &'a str,
  ) -> impl Future<Output = Result<Option<Cohort>, Self::Error>> + Send + 'a;

  /// Lessons of a course ordered by `order`.
  fn load_course_lessons<'a>(
    &'a self,
    course_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Lesson>, Self::Error>> + Send + 'a;

  /// Every lesson-progress record a user has, across courses.
  fn load_lesson_progress<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<LessonProgress>, Self::Error>> + Send + 'a;

  /// A user's achievements, newest first.
  fn load_achievements<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Achievement>, Self::Error>> + Send + 'a;

  /// The snapshot last persisted to the user's profile, if any.
  fn load_cached_progress<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<CachedProgress>, Self::Error>> + Send + 'a;

  /// Persist a snapshot to the user's profile, creating the profile if needed.
  fn save_cached_progress<'a>(
    &'a self,
    progress: &'a CachedProgress,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Insert or replace the record for `(user_id, lesson_id)`.
  fn save_lesson_progress(
    &self,
    record: LessonProgress,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert or replace a lesson.
  fn save_lesson(
    &self,
    lesson: Lesson,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Award `kind` to a user unless they already hold it. Returns the new
  /// award, or `None` when it was already held.
  fn award_achievement<'a>(
    &'a self,
    user_id: &'a str,
    kind: AchievementKind,
  ) -> impl Future<Output = Result<Option<Achievement>, Self::Error>> + Send + 'a;
}
