//! Handlers for per-user `/users/{id}/...` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/users/{id}/progress` | `?force_refresh=true` bypasses the TTL |
//! | `DELETE` | `/users/{id}/progress` | Drops the cached snapshot; 204 |
//! | `GET`    | `/users/{id}/lessons` | Per-lesson unlock and completion flags |
//! | `GET`    | `/users/{id}/community` | Seat occupancy of the active cohort |
//! | `POST`   | `/users/{id}/achievements/check` | Returns newly awarded achievements |

use academy_core::{
  achievement::Achievement,
  progress::{CachedProgress, CommunityStats, LessonAvailability},
  store::{EnrollmentStore, ProgressStore},
};
use academy_service::{InvalidationReason, ProgressOptions};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};

use crate::{AppState, error::ApiError};

/// `GET /users/{id}/progress[?force_refresh=true]`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
  Query(options): Query<ProgressOptions>,
) -> Result<Json<CachedProgress>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.cache.get_cached_progress(&user_id, options).await?))
}

/// `DELETE /users/{id}/progress`
pub async fn invalidate<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
) -> StatusCode
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  state.cache.invalidate(&user_id, InvalidationReason::Manual).await;
  StatusCode::NO_CONTENT
}

/// `GET /users/{id}/lessons`
pub async fn lessons<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Vec<LessonAvailability>>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.cache.lesson_availability(&user_id).await?))
}

/// `GET /users/{id}/community`: `null` when the user has no active cohort.
pub async fn community<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Option<CommunityStats>>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.cache.community_stats(&user_id).await?))
}

/// `POST /users/{id}/achievements/check`
pub async fn check_achievements<S>(
  State(state): State<AppState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Vec<Achievement>>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.cache.check_and_award_achievements(&user_id).await?))
}
