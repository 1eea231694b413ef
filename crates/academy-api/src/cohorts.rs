//! Handler for `GET /cohorts/{id}`.

use academy_core::{
  cohort::Cohort,
  store::{EnrollmentStore, ProgressStore},
};
use axum::{
  Json,
  extract::{Path, State},
};

use crate::{AppState, error::ApiError};

/// `GET /cohorts/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Cohort>, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Ok(Json(state.manager.get_cohort(&id).await?))
}
