//! Enrollment lifecycle and progress caching on top of any academy store.
//!
//! - [`EnrollmentManager`] is the single authority for creating and changing
//!   enrollments.
//! - [`ProgressCache`] memoises the derived per-user progress snapshot with a
//!   TTL and collapses concurrent misses into one recomputation.
//! - [`LessonTracker`] records lesson progress and invalidates the cache.
//!
//! All three are cheap to clone and meant to be shared across tasks.

pub mod achievements;
pub mod cache;
pub mod enrollment;
pub mod error;
pub mod lessons;
pub mod subscription;

pub use cache::{CacheConfig, InvalidationReason, ProgressCache, ProgressOptions};
pub use enrollment::{EnrollmentManager, PaymentCompleted};
pub use error::{Error, Result};
pub use lessons::{LessonCompleted, LessonTracker};
pub use subscription::EnrollmentSubscription;
