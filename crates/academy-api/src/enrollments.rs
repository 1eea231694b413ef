//! Handlers for `/enrollments` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/enrollments` | At most one of `user_id`, `cohort_id`, `course_id`, `status` |
//! | `POST`  | `/enrollments` | Body: [`NewEnrollment`]; 201 when created, 200 when reused |
//! | `GET`   | `/enrollments/active` | `?user_id&course_id` |
//! | `GET`   | `/enrollments/{id}` | Single enrollment |
//! | `PATCH` | `/enrollments/{id}` | Body: [`EnrollmentUpdate`] |
//! | `POST`  | `/enrollments/{id}/reactivate` | 409 when another enrollment is active |

use academy_core::{
  enrollment::{
    Enrollment, EnrollmentOutcome, EnrollmentQuery, EnrollmentStatus,
    EnrollmentUpdate, NewEnrollment,
  },
  store::{EnrollmentStore, ProgressStore},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub user_id:   Option<String>,
  pub cohort_id: Option<String>,
  pub course_id: Option<String>,
  pub status:    Option<EnrollmentStatus>,
}

impl ListParams {
  fn into_query(self) -> Result<EnrollmentQuery, ApiError> {
    let mut filters = Vec::new();
    if let Some(id) = self.user_id {
      filters.push(EnrollmentQuery::User(id));
    }
    if let Some(id) = self.cohort_id {
      filters.push(EnrollmentQuery::Cohort(id));
    }
    if let Some(id) = self.course_id {
      filters.push(EnrollmentQuery::Course(id));
    }
    if let Some(status) = self.status {
      filters.push(EnrollmentQuery::Status(status));
    }

    match filters.len() {
      0 => Ok(EnrollmentQuery::All),
      1 => Ok(filters.remove(0)),
      _ => Err(ApiError::BadRequest(
        "at most one of user_id, cohort_id, course_id, status may be given".into(),
      )),
    }
  }
}

/// `GET /enrollments[?user_id=...|cohort_id=...|course_id=...|status=...]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Enrollment>>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  let query = params.into_query()?;
  Ok(Json(state.manager.list(&query).await?))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /enrollments`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<NewEnrollment>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  let outcome: EnrollmentOutcome = state.manager.create_enrollment(body).await?;
  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(outcome)))
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActiveParams {
  pub user_id:   String,
  pub course_id: String,
}

/// `GET /enrollments/active?user_id=<id>&course_id=<id>`
pub async fn active<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ActiveParams>,
) -> Result<Json<Enrollment>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  state
    .cache
    .active_enrollment(&params.user_id, &params.course_id)
    .await?
    .map(Json)
    .ok_or_else(|| {
      academy_service::Error::NotFound {
        kind: "active enrollment",
        id:   format!("{}/{}", params.user_id, params.course_id),
      }
      .into()
    })
}

/// `GET /enrollments/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Enrollment>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.manager.get_enrollment(&id).await?))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// `PATCH /enrollments/{id}`: only the supplied fields are written.
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  Json(body): Json<EnrollmentUpdate>,
) -> Result<Json<Enrollment>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  if body.is_empty() {
    return Err(ApiError::BadRequest("update has no fields".into()));
  }
  Ok(Json(state.manager.update_enrollment(&id, body).await?))
}

/// `POST /enrollments/{id}/reactivate`
pub async fn reactivate<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Enrollment>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.manager.reactivate_enrollment(&id).await?))
}
