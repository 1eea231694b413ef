//! Achievements awarded for progress milestones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The fixed set of milestones a user can be awarded.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AchievementKind {
  FirstLesson,
  FiveLessons,
  TenLessons,
  Halfway,
  CourseComplete,
  AheadOfCohort,
}

/// A persisted award. A user holds each kind at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
  pub achievement_id: String,
  pub user_id:        String,
  pub kind:           AchievementKind,
  pub awarded_at:     DateTime<Utc>,
}
