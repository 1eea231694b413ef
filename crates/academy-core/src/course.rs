//! Course content.

use serde::{Deserialize, Serialize};

/// One lesson of a course; lessons unlock in `order` sequence, one per week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
  pub lesson_id:        String,
  pub course_id:        String,
  pub title:            String,
  /// 1-based position within the course.
  pub order:            u32,
  pub duration_minutes: u32,
}
