//! Loading/error state for facades.
//!
//! Every facade owns a [`Status`] and wraps each operation in an [`Attempt`]:
//!
//! ```ignore
//! let attempt = self.status.begin();
//! let result = self.fetch(...).await;
//! attempt.finish(&result);
//! result
//! ```
//!
//! Beginning an attempt marks the facade busy and clears the previous error.
//! Finishing records the data or the normalized error; dropping the attempt
//! (including on an early return) clears the busy flag.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ClientError, ErrorCode, ErrorInfo};

/// What the presentation layer reads from a facade.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<T> {
  pub loading: bool,
  pub error: Option<String>,
  pub error_code: Option<ErrorCode>,
  pub data: Option<T>,
}

#[derive(Debug)]
struct StatusState<T> {
  in_flight: usize,
  error: Option<ErrorInfo>,
  data: Option<T>,
}

/// Shared loading/error/data cell for one facade instance.
#[derive(Debug)]
pub struct Status<T> {
  inner: Arc<Mutex<StatusState<T>>>,
}

impl<T> Clone for Status<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T> Default for Status<T> {
  fn default() -> Self {
    Self {
      inner: Arc::new(Mutex::new(StatusState {
        in_flight: 0,
        error: None,
        data: None,
      })),
    }
  }
}

impl<T> Status<T> {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, StatusState<T>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Start a new attempt: busy on, previous error cleared.
  pub fn begin(&self) -> Attempt<'_, T> {
    let mut state = self.state();
    state.in_flight += 1;
    state.error = None;
    Attempt {
      status: self,
      reported: false,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.state().in_flight > 0
  }

  pub fn error(&self) -> Option<ErrorInfo> {
    self.state().error.clone()
  }

  /// Drop the recorded error and data.
  pub fn reset(&self) {
    let mut state = self.state();
    state.error = None;
    state.data = None;
  }
}

impl<T: Clone> Status<T> {
  pub fn data(&self) -> Option<T> {
    self.state().data.clone()
  }

  pub fn snapshot(&self) -> Snapshot<T> {
    let state = self.state();
    Snapshot {
      loading: state.in_flight > 0,
      error: state.error.as_ref().map(|e| e.message.clone()),
      error_code: state.error.as_ref().map(|e| e.code),
      data: state.data.clone(),
    }
  }
}

/// One in-flight operation on a facade.
#[must_use = "an attempt keeps the facade busy until it is dropped"]
pub struct Attempt<'a, T> {
  status: &'a Status<T>,
  reported: bool,
}

impl<T> Attempt<'_, T> {
  /// Record a failure. Only the first failure of an attempt is kept.
  pub fn fail(&mut self, err: &ClientError) {
    if self.reported {
      return;
    }
    self.reported = true;
    tracing::debug!(code = %err.code(), error = %err, "operation failed");
    self.status.state().error = Some(ErrorInfo::from(err));
  }

  /// Record a success and replace the facade data.
  pub fn succeed(&mut self, data: T) {
    if self.reported {
      return;
    }
    self.reported = true;
    self.status.state().data = Some(data);
  }
}

impl<T: Clone> Attempt<'_, T> {
  /// Record the outcome of `result` and end the attempt.
  pub fn finish(mut self, result: &Result<T, ClientError>) {
    match result {
      Ok(data) => self.succeed(data.clone()),
      Err(err) => self.fail(err),
    }
  }
}

impl<T> Drop for Attempt<'_, T> {
  fn drop(&mut self) {
    let mut state = self.status.state();
    state.in_flight = state.in_flight.saturating_sub(1);
  }
}
