//! Milestone achievements derived from a user's progress snapshot.

use academy_core::{
  achievement::{Achievement, AchievementKind},
  progress::CachedProgress,
  store::ProgressStore,
};

use crate::{
  Error, Result,
  cache::{InvalidationReason, ProgressCache, ProgressOptions},
};

/// Every achievement `progress` qualifies for, held or not.
pub fn earned(progress: &CachedProgress) -> Vec<AchievementKind> {
  let completed = progress.completed_lessons;
  let total = progress.total_lessons;

  let mut kinds = Vec::new();
  if completed >= 1 {
    kinds.push(AchievementKind::FirstLesson);
  }
  if completed >= 5 {
    kinds.push(AchievementKind::FiveLessons);
  }
  if completed >= 10 {
    kinds.push(AchievementKind::TenLessons);
  }
  if total > 0 && completed * 2 >= total {
    kinds.push(AchievementKind::Halfway);
  }
  if total > 0 && completed >= total {
    kinds.push(AchievementKind::CourseComplete);
  }
  if progress.cohort_comparison.as_ref().is_some_and(|c| c.is_ahead) {
    kinds.push(AchievementKind::AheadOfCohort);
  }
  kinds
}

impl<S> ProgressCache<S>
where
  S: ProgressStore + 'static,
{
  /// Award every achievement the user qualifies for and does not yet hold.
  /// Returns only the new awards; the cache is invalidated when there are any.
  pub async fn check_and_award_achievements(&self, user_id: &str) -> Result<Vec<Achievement>> {
    let progress = self
      .get_cached_progress(user_id, ProgressOptions::default())
      .await?;

    let mut awarded = Vec::new();
    for kind in earned(&progress) {
      if let Some(achievement) = self
        .store()
        .award_achievement(user_id, kind)
        .await
        .map_err(Error::persistence)?
      {
        tracing::info!(user_id, achievement = kind.as_ref(), "achievement awarded");
        awarded.push(achievement);
      }
    }

    if !awarded.is_empty() {
      self.invalidate(user_id, InvalidationReason::AchievementAwarded).await;
    }
    Ok(awarded)
  }
}
