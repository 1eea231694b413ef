//! [`ProgressCache`]: a per-user TTL cache over the derived progress
//! snapshot, with single-flight recomputation.
//!
//! The fast store is an in-process map owned by the cache instance; there is
//! no global state. Each user has one entry holding the progress snapshot and
//! a few sibling slots (active enrollment, lesson availability, community
//! stats). Invalidation drops the whole entry.
//!
//! Concurrent misses for the same user share one computation: the first
//! caller registers a [`Shared`] future in the in-flight map and later callers
//! await a clone of it. A per-user generation is advanced on every
//! invalidation, so a computation that started before an invalidation never
//! writes its (possibly stale) result back.

use std::{collections::HashMap, sync::Arc};

use academy_core::{
  cohort::Cohort,
  enrollment::Enrollment,
  progress::{
    CachedProgress, CommunityStats, LessonAvailability, PROGRESS_VERSION,
    ProgressInputs, compute_progress, lesson_availability,
  },
  store::ProgressStore,
};
use chrono::{DateTime, Duration, Utc};
use futures::{
  FutureExt as _,
  future::{BoxFuture, Shared},
};
use serde::Deserialize;
use strum::AsRefStr;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
  Error, Result,
  error::SharedStoreError,
};

type Computation = Shared<BoxFuture<'static, Result<CachedProgress, SharedStoreError>>>;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Maximum age of a served snapshot. Default: 1 hour.
  pub ttl: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self { Self { ttl: Duration::hours(1) } }
}

impl CacheConfig {
  #[must_use]
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }
}

/// Per-call knobs for [`ProgressCache::get_cached_progress`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ProgressOptions {
  /// Skip the freshness check. An in-flight computation is still joined.
  #[serde(default)]
  pub force_refresh: bool,
}

impl ProgressOptions {
  pub fn forced() -> Self { Self { force_refresh: true } }
}

/// Why an entry was dropped; recorded in logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum InvalidationReason {
  LessonCompleted,
  WatchProgress,
  EnrollmentChanged,
  AchievementAwarded,
  Manual,
}

// ─── Fast store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Slot<T> {
  value:     T,
  cached_at: DateTime<Utc>,
}

impl<T: Clone> Slot<T> {
  fn new(value: T) -> Self { Self { value, cached_at: Utc::now() } }

  fn fresh(&self, now: DateTime<Utc>, ttl: Duration) -> Option<T> {
    (now.signed_duration_since(self.cached_at) < ttl).then(|| self.value.clone())
  }
}

#[derive(Debug, Default)]
struct UserEntry {
  progress:            Option<CachedProgress>,
  /// Keyed by course id.
  active_enrollments:  HashMap<String, Slot<Option<Enrollment>>>,
  lesson_availability: Option<Slot<Vec<LessonAvailability>>>,
  community_stats:     Option<Slot<Option<CommunityStats>>>,
}

#[derive(Default)]
struct State {
  entries:     HashMap<String, UserEntry>,
  in_flight:   HashMap<String, Computation>,
  /// Epoch of each user's last invalidation since the last clear.
  generations: HashMap<String, u64>,
  /// Strictly increasing; advanced by every invalidation and clear.
  epoch:       u64,
  /// Generation of every user absent from `generations`.
  cleared_at:  u64,
}

impl State {
  fn generation(&self, user_id: &str) -> u64 {
    self.generations.get(user_id).copied().unwrap_or(self.cleared_at)
  }

  fn bump(&mut self, user_id: &str) {
    self.epoch += 1;
    self.generations.insert(user_id.to_owned(), self.epoch);
  }

  /// Drop all per-user state. Every generation read before this call stops
  /// matching, so in-flight work cannot write back.
  fn reset(&mut self) {
    self.epoch += 1;
    self.cleared_at = self.epoch;
    self.generations.clear();
    self.in_flight.clear();
    self.entries.clear();
  }
}

struct Inner<S> {
  store:  Arc<S>,
  config: CacheConfig,
  state:  Mutex<State>,
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Cheap to clone; clones share the same fast store.
pub struct ProgressCache<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for ProgressCache<S> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S> ProgressCache<S>
where
  S: ProgressStore + 'static,
{
  pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        config,
        state: Mutex::new(State::default()),
      }),
    }
  }

  pub(crate) fn store(&self) -> &Arc<S> { &self.inner.store }

  pub fn ttl(&self) -> Duration { self.inner.config.ttl }

  /// Return the user's progress snapshot, recomputing it when it is missing,
  /// older than the TTL, or `force_refresh` is set.
  #[instrument(skip(self), fields(force_refresh = options.force_refresh))]
  pub async fn get_cached_progress(
    &self,
    user_id: &str,
    options: ProgressOptions,
  ) -> Result<CachedProgress> {
    let computation = {
      let mut state = self.inner.state.lock().await;

      if !options.force_refresh
        && let Some(progress) = state.entries.get(user_id).and_then(|e| e.progress.as_ref())
        && progress.is_fresh(Utc::now(), self.inner.config.ttl)
      {
        tracing::trace!("progress cache hit");
        return Ok(progress.clone());
      }

      match state.in_flight.get(user_id) {
        Some(running) => {
          tracing::debug!("joining in-flight progress computation");
          running.clone()
        }
        None => {
          let generation = state.generation(user_id);
          let computation = self.computation(user_id.to_owned(), generation);
          state.in_flight.insert(user_id.to_owned(), computation.clone());
          computation
        }
      }
    };

    computation.await.map_err(Error::CacheComputation)
  }

  /// Build the shared computation for `user_id`. It is lazy: nothing runs
  /// until the first caller awaits it.
  fn computation(&self, user_id: String, generation: u64) -> Computation {
    let inner = Arc::clone(&self.inner);

    async move {
      let result = recompute(inner.store.as_ref(), &user_id)
        .await
        .map_err(|e| Arc::new(e) as SharedStoreError);

      let current = {
        let mut state = inner.state.lock().await;
        let current = state.generation(&user_id) == generation;
        if current {
          state.in_flight.remove(&user_id);
          if let Ok(progress) = &result {
            state.entries.entry(user_id.clone()).or_default().progress =
              Some(progress.clone());
          }
        }
        current
      };

      match &result {
        Ok(progress) if current => {
          if let Err(e) = inner.store.save_cached_progress(progress).await {
            tracing::warn!(%user_id, error = %e, "failed to persist cached progress");
          }
        }
        Ok(_) => {
          tracing::debug!(%user_id, "discarding progress computed before an invalidation");
        }
        Err(e) => {
          tracing::warn!(%user_id, error = %e, "progress computation failed");
        }
      }

      result
    }
    .boxed()
    .shared()
  }

  /// Drop everything cached for `user_id`. The next read recomputes, and any
  /// computation already running will not write its result back.
  pub async fn invalidate(&self, user_id: &str, reason: InvalidationReason) {
    let mut state = self.inner.state.lock().await;
    state.entries.remove(user_id);
    state.in_flight.remove(user_id);
    state.bump(user_id);
    tracing::debug!(user_id, reason = reason.as_ref(), "progress cache invalidated");
  }

  /// Drop every entry, including the per-user invalidation history.
  pub async fn clear(&self) {
    self.inner.state.lock().await.reset();
  }

  #[cfg(test)]
  pub(crate) async fn tracked_users(&self) -> usize {
    self.inner.state.lock().await.generations.len()
  }

  /// The snapshot currently held for `user_id`, regardless of its age.
  pub async fn cached(&self, user_id: &str) -> Option<CachedProgress> {
    let state = self.inner.state.lock().await;
    state.entries.get(user_id).and_then(|e| e.progress.clone())
  }

  /// Load the snapshot persisted on the user's profile into the fast store.
  ///
  /// The loaded snapshot is subject to the normal TTL check on read. Returns
  /// whether anything was loaded; a persisted snapshot from another schema
  /// version or older than the one already held is ignored.
  pub async fn hydrate(&self, user_id: &str) -> Result<bool> {
    let Some(persisted) = self
      .inner
      .store
      .load_cached_progress(user_id)
      .await
      .map_err(Error::persistence)?
    else {
      return Ok(false);
    };
    if persisted.version != PROGRESS_VERSION {
      return Ok(false);
    }

    let mut state = self.inner.state.lock().await;
    let entry = state.entries.entry(user_id.to_owned()).or_default();
    let newer = entry
      .progress
      .as_ref()
      .is_none_or(|held| held.last_calculated < persisted.last_calculated);
    if newer {
      entry.progress = Some(persisted);
    }
    Ok(newer)
  }

  // ── Sibling slots ─────────────────────────────────────────────────────────

  /// The user's active enrollment in `course_id`, cached alongside progress.
  pub async fn active_enrollment(
    &self,
    user_id: &str,
    course_id: &str,
  ) -> Result<Option<Enrollment>> {
    let generation = {
      let state = self.inner.state.lock().await;
      if let Some(hit) = state
        .entries
        .get(user_id)
        .and_then(|e| e.active_enrollments.get(course_id))
        .and_then(|slot| slot.fresh(Utc::now(), self.ttl()))
      {
        return Ok(hit);
      }
      state.generation(user_id)
    };

    let active = self
      .inner
      .store
      .load_user_enrollments(user_id)
      .await
      .map_err(computation_error)?
      .into_iter()
      .filter(|e| e.course_id == course_id && e.status.is_active())
      .max_by_key(|e| e.enrolled_at);

    self
      .store_slot(user_id, generation, |entry| {
        entry
          .active_enrollments
          .insert(course_id.to_owned(), Slot::new(active.clone()));
      })
      .await;
    Ok(active)
  }

  /// Which lessons of the user's active course are unlocked and completed.
  /// Empty when the user has no active enrollment.
  pub async fn lesson_availability(&self, user_id: &str) -> Result<Vec<LessonAvailability>> {
    let generation = {
      let state = self.inner.state.lock().await;
      if let Some(hit) = state
        .entries
        .get(user_id)
        .and_then(|e| e.lesson_availability.as_ref())
        .and_then(|slot| slot.fresh(Utc::now(), self.ttl()))
      {
        return Ok(hit);
      }
      state.generation(user_id)
    };

    let store = self.inner.store.as_ref();
    let availability = match self.active_context(user_id).await? {
      Some((enrollment, Some(cohort))) => {
        let lessons = store
          .load_course_lessons(&enrollment.course_id)
          .await
          .map_err(computation_error)?;
        let records = store
          .load_lesson_progress(user_id)
          .await
          .map_err(computation_error)?;
        lesson_availability(&lessons, cohort.start_date, Utc::now(), &records)
      }
      _ => Vec::new(),
    };

    self
      .store_slot(user_id, generation, |entry| {
        entry.lesson_availability = Some(Slot::new(availability.clone()));
      })
      .await;
    Ok(availability)
  }

  /// Seat occupancy of the cohort the user is actively enrolled in.
  pub async fn community_stats(&self, user_id: &str) -> Result<Option<CommunityStats>> {
    let generation = {
      let state = self.inner.state.lock().await;
      if let Some(hit) = state
        .entries
        .get(user_id)
        .and_then(|e| e.community_stats.as_ref())
        .and_then(|slot| slot.fresh(Utc::now(), self.ttl()))
      {
        return Ok(hit);
      }
      state.generation(user_id)
    };

    let stats = self
      .active_context(user_id)
      .await?
      .and_then(|(_, cohort)| cohort)
      .as_ref()
      .map(CommunityStats::from);

    self
      .store_slot(user_id, generation, |entry| {
        entry.community_stats = Some(Slot::new(stats.clone()));
      })
      .await;
    Ok(stats)
  }

  async fn active_context(
    &self,
    user_id: &str,
  ) -> Result<Option<(Enrollment, Option<Cohort>)>> {
    let store = self.inner.store.as_ref();
    let inputs = ProgressInputs {
      enrollments: store
        .load_user_enrollments(user_id)
        .await
        .map_err(computation_error)?,
      ..ProgressInputs::default()
    };
    let Some(active) = inputs.active_enrollment().cloned() else {
      return Ok(None);
    };
    let cohort = store
      .load_cohort(&active.cohort_id)
      .await
      .map_err(computation_error)?;
    Ok(Some((active, cohort)))
  }

  /// Write into a user's entry unless it was invalidated since `generation`
  /// was read. Other slots in the entry are left as they are.
  async fn store_slot(
    &self,
    user_id: &str,
    generation: u64,
    write: impl FnOnce(&mut UserEntry),
  ) {
    let mut state = self.inner.state.lock().await;
    if state.generation(user_id) == generation {
      write(state.entries.entry(user_id.to_owned()).or_default());
    }
  }
}

/// Read every input of a user's snapshot and derive it.
async fn recompute<S: ProgressStore>(
  store: &S,
  user_id: &str,
) -> std::result::Result<CachedProgress, S::Error> {
  let mut inputs = ProgressInputs {
    enrollments: store.load_user_enrollments(user_id).await?,
    lesson_progress: store.load_lesson_progress(user_id).await?,
    achievements: store.load_achievements(user_id).await?,
    ..ProgressInputs::default()
  };

  if let Some(active) = inputs.active_enrollment().cloned() {
    inputs.cohort = store.load_cohort(&active.cohort_id).await?;
    inputs.lessons = store.load_course_lessons(&active.course_id).await?;
  }

  Ok(compute_progress(user_id, &inputs, Utc::now()))
}

fn computation_error<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::CacheComputation(Arc::new(e))
}
