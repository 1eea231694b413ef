//! Handler for the payment-success boundary.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/payments/success` | Body: [`PaymentCompleted`]; 201 when enrolled now, 200 on replay |

use academy_core::store::{EnrollmentStore, ProgressStore};
use academy_service::PaymentCompleted;
use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{AppState, error::ApiError};

/// `POST /payments/success`
///
/// A replay of an already-processed payment is reported as
/// `{"already_enrolled": true}`, never as an error.
pub async fn success<S>(
  State(state): State<AppState<S>>,
  Json(payment): Json<PaymentCompleted>,
) -> Result<Response, ApiError>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  let outcome = state.manager.handle_payment_success(payment).await?;
  if outcome.created {
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
  } else {
    let body = json!({
      "already_enrolled": true,
      "enrollment_id": outcome.enrollment_id,
    });
    Ok((StatusCode::OK, Json(body)).into_response())
  }
}
