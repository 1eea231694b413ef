//! Change subscriptions over enrollment queries.

use std::sync::Arc;

use academy_core::{
  enrollment::{Enrollment, EnrollmentQuery},
  store::EnrollmentStore,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{Error, Result};

/// Published by the manager after every enrollment mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentChange {
  pub enrollment_id: String,
  pub user_id:       String,
}

/// A live view of one [`EnrollmentQuery`].
///
/// Each call to [`next`](Self::next) yields the complete result set. The
/// first call returns immediately; later calls wait for a relevant change.
pub struct EnrollmentSubscription<S> {
  store:   Arc<S>,
  query:   EnrollmentQuery,
  changes: broadcast::Receiver<EnrollmentChange>,
  primed:  bool,
}

impl<S: EnrollmentStore> EnrollmentSubscription<S> {
  pub(crate) fn new(
    store: Arc<S>,
    query: EnrollmentQuery,
    changes: broadcast::Receiver<EnrollmentChange>,
  ) -> Self {
    Self { store, query, changes, primed: false }
  }

  pub fn query(&self) -> &EnrollmentQuery { &self.query }

  /// Wait for the next result set. Returns `None` once the manager that
  /// owns the change channel has been dropped.
  pub async fn next(&mut self) -> Option<Result<Vec<Enrollment>>> {
    if self.primed {
      loop {
        match self.changes.recv().await {
          Ok(change) if self.is_relevant(&change) => break,
          Ok(_) => continue,
          Err(RecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "enrollment subscription lagged; refetching");
            break;
          }
          Err(RecvError::Closed) => return None,
        }
      }
    }
    self.primed = true;

    Some(
      self
        .store
        .list_enrollments(&self.query)
        .await
        .map_err(Error::persistence),
    )
  }

  /// User queries only wake for that user's changes. The other filters can't
  /// be decided from the change alone, so they always refetch.
  fn is_relevant(&self, change: &EnrollmentChange) -> bool {
    match &self.query {
      EnrollmentQuery::User(user_id) => &change.user_id == user_id,
      _ => true,
    }
  }
}
