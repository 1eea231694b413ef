//! JSON HTTP API for the academy enrollment and progress services.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`EnrollmentStore`] and [`ProgressStore`]. Auth and TLS are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", academy_api::api_router(AppState::new(store, CacheConfig::default())))
//! ```

pub mod cohorts;
pub mod enrollments;
pub mod error;
pub mod lessons;
pub mod payments;
pub mod progress;

use std::{path::PathBuf, sync::Arc};

use academy_core::store::{EnrollmentStore, ProgressStore};
use academy_service::{CacheConfig, EnrollmentManager, LessonTracker, ProgressCache};
use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ACADEMY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:           String,
  #[serde(default = "default_port")]
  pub port:           u16,
  pub store_path:     PathBuf,
  /// Progress snapshot lifetime in seconds.
  #[serde(default = "default_cache_ttl_secs")]
  pub cache_ttl_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_cache_ttl_secs() -> u64 { 3600 }

impl ServerConfig {
  pub fn cache_config(&self) -> CacheConfig {
    let secs = i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX);
    CacheConfig::default().with_ttl(chrono::Duration::seconds(secs))
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers. The three services share one
/// progress cache.
pub struct AppState<S> {
  pub manager: EnrollmentManager<S>,
  pub cache:   ProgressCache<S>,
  pub lessons: LessonTracker<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      manager: self.manager.clone(),
      cache:   self.cache.clone(),
      lessons: self.lessons.clone(),
    }
  }
}

impl<S> AppState<S>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
    let cache = ProgressCache::new(Arc::clone(&store), config);
    Self {
      manager: EnrollmentManager::new(store, cache.clone()),
      lessons: LessonTracker::new(cache.clone()),
      cache,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: EnrollmentStore + ProgressStore + 'static,
{
  Router::new()
    // Payments
    .route("/payments/success", post(payments::success::<S>))
    // Enrollments
    .route(
      "/enrollments",
      get(enrollments::list::<S>).post(enrollments::create::<S>),
    )
    .route("/enrollments/active", get(enrollments::active::<S>))
    .route(
      "/enrollments/{id}",
      get(enrollments::get_one::<S>).patch(enrollments::update::<S>),
    )
    .route("/enrollments/{id}/reactivate", post(enrollments::reactivate::<S>))
    // Lessons
    .route("/lessons/complete", post(lessons::complete::<S>))
    .route("/lessons/progress", post(lessons::watch::<S>))
    // Per-user progress
    .route(
      "/users/{id}/progress",
      get(progress::get_one::<S>).delete(progress::invalidate::<S>),
    )
    .route("/users/{id}/lessons", get(progress::lessons::<S>))
    .route("/users/{id}/community", get(progress::community::<S>))
    .route("/users/{id}/achievements/check", post(progress::check_achievements::<S>))
    // Cohorts
    .route("/cohorts/{id}", get(cohorts::get_one::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
