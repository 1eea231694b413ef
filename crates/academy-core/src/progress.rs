//! Lesson progress records and the derived per-user progress snapshot.
//!
//! Everything in this module is pure: the cache layer gathers the inputs from
//! the store and calls [`compute_progress`]. Keeping the arithmetic here means
//! it can be tested without a store or a clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  achievement::Achievement,
  cohort::Cohort,
  course::Lesson,
  enrollment::{Enrollment, EnrollmentStatus},
};

/// Completion rate the average cohort member is assumed to have, in percent.
pub const COHORT_BASELINE_PERCENT: f64 = 60.0;
/// A user counts as ahead/behind when their rate differs from the baseline by
/// more than this many percentage points.
pub const COHORT_DEVIATION_THRESHOLD: f64 = 10.0;
/// Upper clamp on the displayed streak.
pub const MAX_STREAK_DAYS: u32 = 30;
/// How many achievements the snapshot carries.
pub const RECENT_ACHIEVEMENTS: usize = 5;
/// Schema version stamped on every snapshot.
pub const PROGRESS_VERSION: u32 = 1;

// ─── Source records ──────────────────────────────────────────────────────────

/// A user's progress through a single lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
  pub user_id:            String,
  pub lesson_id:          String,
  pub course_id:          String,
  pub completed:          bool,
  pub completed_at:       Option<DateTime<Utc>>,
  /// 0–100; also used as a watch-time proxy when summed.
  pub watched_percentage: f64,
}

// ─── Derived snapshot ────────────────────────────────────────────────────────

/// Where a user stands relative to the cohort baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortComparison {
  pub user_percentage: f64,
  pub cohort_average:  f64,
  /// `user_percentage - cohort_average`, in percentage points.
  pub difference:      f64,
  pub is_ahead:        bool,
  pub is_behind:       bool,
}

/// The disposable, derived view of one user's progress. Never a source of
/// truth; recomputed from the source collections whenever it goes stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProgress {
  pub user_id:             String,
  pub completed_lessons:   u32,
  pub completed_courses:   u32,
  pub total_lessons:       u32,
  pub available_lessons:   u32,
  pub current_streak:      u32,
  pub cohort_comparison:   Option<CohortComparison>,
  pub total_watch_minutes: u64,
  pub achievement_count:   u32,
  pub recent_achievements: Vec<Achievement>,
  pub last_calculated:     DateTime<Utc>,
  pub version:             u32,
}

impl CachedProgress {
  /// Whether this snapshot is younger than `ttl` at `now`.
  pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(self.last_calculated) < ttl
  }
}

/// Whether a single lesson is open to the user yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonAvailability {
  pub lesson_id: String,
  pub order:     u32,
  pub unlocked:  bool,
  pub completed: bool,
}

/// Occupancy figures for the cohort a user is enrolled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityStats {
  pub cohort_id:         String,
  pub enrolled_students: u32,
  pub max_students:      u32,
  pub seats_remaining:   u32,
}

impl From<&Cohort> for CommunityStats {
  fn from(c: &Cohort) -> Self {
    Self {
      cohort_id:         c.cohort_id.clone(),
      enrolled_students: c.current_students,
      max_students:      c.max_students,
      seats_remaining:   c.seats_remaining(),
    }
  }
}

// ─── Derivations ─────────────────────────────────────────────────────────────

/// Lessons unlock one per elapsed week, starting with the first on day zero.
/// Returns 0 before the cohort starts and never more than `total`.
pub fn available_lessons(
  cohort_start: DateTime<Utc>,
  now: DateTime<Utc>,
  total: u32,
) -> u32 {
  if now < cohort_start {
    return 0;
  }
  let weeks = now.signed_duration_since(cohort_start).num_weeks();
  let unlocked = u32::try_from(weeks.saturating_add(1)).unwrap_or(u32::MAX);
  unlocked.min(total)
}

/// Compare `completed` out of `available` lessons against the fixed cohort
/// baseline. `None` when nothing is available yet.
pub fn cohort_comparison(completed: u32, available: u32) -> Option<CohortComparison> {
  if available == 0 {
    return None;
  }
  let user_percentage = f64::from(completed) * 100.0 / f64::from(available);
  let difference = user_percentage - COHORT_BASELINE_PERCENT;
  Some(CohortComparison {
    user_percentage,
    cohort_average: COHORT_BASELINE_PERCENT,
    difference,
    is_ahead: difference > COHORT_DEVIATION_THRESHOLD,
    is_behind: difference < -COHORT_DEVIATION_THRESHOLD,
  })
}

/// Whole days since the most recent completion, clamped to
/// [`MAX_STREAK_DAYS`]. This is a recency counter, not a run of consecutive
/// active days; 0 means "completed something today or never".
pub fn current_streak(
  last_completed: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
) -> u32 {
  let Some(last) = last_completed else { return 0 };
  let days = now.signed_duration_since(last).num_days().max(0);
  u32::try_from(days).unwrap_or(u32::MAX).min(MAX_STREAK_DAYS)
}

/// Sum of watched percentages, read as seconds and reported in whole minutes.
pub fn total_watch_minutes(records: &[LessonProgress]) -> u64 {
  let seconds: f64 = records
    .iter()
    .map(|r| r.watched_percentage.max(0.0))
    .sum();
  (seconds / 60.0).floor() as u64
}

/// Per-lesson unlock state for a course given the cohort start.
pub fn lesson_availability(
  lessons: &[Lesson],
  cohort_start: DateTime<Utc>,
  now: DateTime<Utc>,
  records: &[LessonProgress],
) -> Vec<LessonAvailability> {
  let mut ordered: Vec<&Lesson> = lessons.iter().collect();
  ordered.sort_by_key(|l| l.order);

  let available = available_lessons(cohort_start, now, ordered.len() as u32) as usize;
  ordered
    .into_iter()
    .enumerate()
    .map(|(idx, lesson)| LessonAvailability {
      lesson_id: lesson.lesson_id.clone(),
      order:     lesson.order,
      unlocked:  idx < available,
      completed: is_completed(records, &lesson.lesson_id),
    })
    .collect()
}

fn is_completed(records: &[LessonProgress], lesson_id: &str) -> bool {
  records.iter().any(|r| r.completed && r.lesson_id == lesson_id)
}

// ─── Snapshot assembly ───────────────────────────────────────────────────────

/// Everything [`compute_progress`] reads, gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct ProgressInputs {
  /// All of the user's enrollments, any status.
  pub enrollments:     Vec<Enrollment>,
  /// Cohort of the active enrollment, if there is one.
  pub cohort:          Option<Cohort>,
  /// Lessons of the active enrollment's course.
  pub lessons:         Vec<Lesson>,
  pub lesson_progress: Vec<LessonProgress>,
  pub achievements:    Vec<Achievement>,
}

impl ProgressInputs {
  /// The enrollment the snapshot is computed against: the most recently
  /// created active one.
  pub fn active_enrollment(&self) -> Option<&Enrollment> {
    self
      .enrollments
      .iter()
      .filter(|e| e.status.is_active())
      .max_by_key(|e| e.enrolled_at)
  }
}

/// Build the snapshot for `user_id` at `now`.
pub fn compute_progress(
  user_id: &str,
  inputs: &ProgressInputs,
  now: DateTime<Utc>,
) -> CachedProgress {
  let active = inputs.active_enrollment();

  let course_records: Vec<&LessonProgress> = inputs
    .lesson_progress
    .iter()
    .filter(|r| active.is_none_or(|e| e.course_id == r.course_id))
    .collect();
  let completed_lessons =
    course_records.iter().filter(|r| r.completed).count() as u32;

  let completed_courses = inputs
    .enrollments
    .iter()
    .filter(|e| e.status == EnrollmentStatus::Completed)
    .count() as u32;

  let mut lessons: Vec<&Lesson> = inputs.lessons.iter().collect();
  lessons.sort_by_key(|l| l.order);
  let total_lessons = lessons.len() as u32;

  let available = match (active, &inputs.cohort) {
    (Some(_), Some(cohort)) => available_lessons(cohort.start_date, now, total_lessons),
    _ => 0,
  };

  let completed_available = lessons
    .iter()
    .take(available as usize)
    .filter(|l| is_completed(&inputs.lesson_progress, &l.lesson_id))
    .count() as u32;

  let last_completed = inputs
    .lesson_progress
    .iter()
    .filter(|r| r.completed)
    .filter_map(|r| r.completed_at)
    .max();

  let mut achievements = inputs.achievements.clone();
  achievements.sort_by(|a, b| b.awarded_at.cmp(&a.awarded_at));
  let achievement_count = achievements.len() as u32;
  achievements.truncate(RECENT_ACHIEVEMENTS);

  CachedProgress {
    user_id: user_id.to_owned(),
    completed_lessons,
    completed_courses,
    total_lessons,
    available_lessons: available,
    current_streak: current_streak(last_completed, now),
    cohort_comparison: cohort_comparison(completed_available, available),
    total_watch_minutes: total_watch_minutes(&inputs.lesson_progress),
    achievement_count,
    recent_achievements: achievements,
    last_calculated: now,
    version: PROGRESS_VERSION,
  }
}
