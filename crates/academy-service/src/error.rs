//! Error taxonomy for the service layer.

use std::sync::Arc;

use thiserror::Error;

/// A boxed store error, type-erased so callers need not be generic over the
/// backend.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// A store error shared between every caller awaiting one computation.
pub type SharedStoreError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// Required input was missing or malformed; the caller must correct it.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  /// The write would break the one-active-enrollment invariant.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("persistence error: {0}")]
  Persistence(#[source] StoreError),

  /// Reading the inputs of a progress snapshot failed. Nothing was cached.
  #[error("progress computation failed: {0}")]
  CacheComputation(#[source] SharedStoreError),
}

impl Error {
  pub(crate) fn persistence<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(e))
  }

  pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
    Self::NotFound { kind, id: id.to_owned() }
  }
}

impl From<academy_core::Error> for Error {
  fn from(e: academy_core::Error) -> Self {
    match e {
      academy_core::Error::Validation(msg) => Self::Validation(msg),
      other => Self::persistence(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
