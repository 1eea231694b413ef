//! Lesson-progress writes. Every write invalidates the user's progress.

use std::sync::Arc;

use academy_core::{progress::LessonProgress, store::ProgressStore};
use chrono::Utc;
use serde::Deserialize;

use crate::{
  Error, Result,
  cache::{InvalidationReason, ProgressCache},
};

/// A learner finished a lesson.
#[derive(Debug, Clone, Deserialize)]
pub struct LessonCompleted {
  pub user_id:   String,
  pub lesson_id: String,
  pub course_id: String,
}

pub struct LessonTracker<S> {
  store: Arc<S>,
  cache: ProgressCache<S>,
}

impl<S> Clone for LessonTracker<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), cache: self.cache.clone() }
  }
}

impl<S> LessonTracker<S>
where
  S: ProgressStore + 'static,
{
  pub fn new(cache: ProgressCache<S>) -> Self {
    Self { store: Arc::clone(cache.store()), cache }
  }

  /// Mark a lesson completed now. The watched percentage never drops below
  /// whatever was already recorded, and is raised to 100.
  pub async fn complete_lesson(&self, event: LessonCompleted) -> Result<LessonProgress> {
    require("user_id", &event.user_id)?;
    require("lesson_id", &event.lesson_id)?;
    require("course_id", &event.course_id)?;

    let existing = self.existing(&event.user_id, &event.lesson_id).await?;
    let watched = existing
      .as_ref()
      .map_or(100.0, |r| r.watched_percentage.max(100.0));

    let record = LessonProgress {
      user_id:            event.user_id,
      lesson_id:          event.lesson_id,
      course_id:          event.course_id,
      completed:          true,
      completed_at:       Some(Utc::now()),
      watched_percentage: watched,
    };
    self
      .store
      .save_lesson_progress(record.clone())
      .await
      .map_err(Error::persistence)?;

    tracing::info!(
      user_id = %record.user_id,
      lesson_id = %record.lesson_id,
      "lesson completed"
    );
    self
      .cache
      .invalidate(&record.user_id, InvalidationReason::LessonCompleted)
      .await;
    Ok(record)
  }

  /// Record how much of a lesson was watched, clamped to 0–100. A completed
  /// lesson stays completed.
  pub async fn record_watch_progress(
    &self,
    user_id: &str,
    lesson_id: &str,
    course_id: &str,
    percentage: f64,
  ) -> Result<LessonProgress> {
    require("user_id", user_id)?;
    require("lesson_id", lesson_id)?;
    require("course_id", course_id)?;
    if percentage.is_nan() {
      return Err(Error::Validation("watched percentage is not a number".into()));
    }

    let existing = self.existing(user_id, lesson_id).await?;
    let record = LessonProgress {
      user_id:            user_id.to_owned(),
      lesson_id:          lesson_id.to_owned(),
      course_id:          course_id.to_owned(),
      completed:          existing.as_ref().is_some_and(|r| r.completed),
      completed_at:       existing.as_ref().and_then(|r| r.completed_at),
      watched_percentage: percentage.clamp(0.0, 100.0),
    };
    self
      .store
      .save_lesson_progress(record.clone())
      .await
      .map_err(Error::persistence)?;

    self
      .cache
      .invalidate(user_id, InvalidationReason::WatchProgress)
      .await;
    Ok(record)
  }

  async fn existing(&self, user_id: &str, lesson_id: &str) -> Result<Option<LessonProgress>> {
    let records = self
      .store
      .load_lesson_progress(user_id)
      .await
      .map_err(Error::persistence)?;
    Ok(records.into_iter().find(|r| r.lesson_id == lesson_id))
  }
}

fn require(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::Validation(format!("missing required field: {field}")));
  }
  Ok(())
}
