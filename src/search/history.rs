//! Recently run searches, most recent first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of searches kept.
pub const HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHistoryEntry {
  pub query: String,
  pub result_count: usize,
  pub total_count: u64,
  pub timestamp: DateTime<Utc>,
}

/// Bounded search history shared by the facades of one client.
///
/// Re-running a query moves it to the front instead of adding a duplicate.
#[derive(Debug, Clone, Default)]
pub struct SearchHistory {
  entries: Arc<Mutex<VecDeque<SearchHistoryEntry>>>,
}

impl SearchHistory {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, VecDeque<SearchHistoryEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn record(&self, query: &str, result_count: usize, total_count: u64) {
    let mut entries = self.lock();
    entries.retain(|entry| entry.query != query);
    entries.push_front(SearchHistoryEntry {
      query: query.to_string(),
      result_count,
      total_count,
      timestamp: Utc::now(),
    });
    entries.truncate(HISTORY_CAPACITY);
  }

  pub fn entries(&self) -> Vec<SearchHistoryEntry> {
    self.lock().iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }
}
