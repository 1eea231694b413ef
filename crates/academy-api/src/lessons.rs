//! Handlers for `/lessons` endpoints.

use academy_core::{
  progress::LessonProgress,
  store::{EnrollmentStore, ProgressStore},
};
use academy_service::LessonCompleted;
use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// `POST /lessons/complete`
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  Json(event): Json<LessonCompleted>,
) -> Result<Json<LessonProgress>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.lessons.complete_lesson(event).await?))
}

#[derive(Debug, Deserialize)]
pub struct WatchBody {
  pub user_id:            String,
  pub lesson_id:          String,
  pub course_id:          String,
  pub watched_percentage: f64,
}

/// `POST /lessons/progress`: records partial viewing without completing.
pub async fn watch<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<WatchBody>,
) -> Result<Json<LessonProgress>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  let record = state
    .lessons
    .record_watch_progress(
      &body.user_id,
      &body.lesson_id,
      &body.course_id,
      body.watched_percentage,
    )
    .await?;
  Ok(Json(record))
}
