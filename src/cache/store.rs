//! Cache store: derived key to typed result set.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{Cacheable, QueryKey, ResultSet};
use crate::error::ClientError;

type Entries = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Process-wide response cache shared by every facade of a client.
///
/// Cloning yields another handle onto the same entries.
#[derive(Clone, Default)]
pub struct CacheStore {
  entries: Arc<Mutex<Entries>>,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, Entries> {
    // Critical sections never panic midway, so a poisoned map is still consistent.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get the cached result set for a key.
  ///
  /// An entry stored with a different item type counts as a miss.
  pub fn get<T: Cacheable>(&self, key: &impl QueryKey) -> Option<Arc<ResultSet<T>>> {
    let key = key.key();
    let entry = self.entries().get(&key).cloned()?;
    match entry.downcast::<ResultSet<T>>() {
      Ok(set) => Some(set),
      Err(_) => {
        tracing::warn!(key = %key, expected = T::entity_type(), "cache entry has another item type");
        None
      }
    }
  }

  /// Store a result set, replacing whatever the key held before.
  pub fn put<T: Cacheable>(&self, key: &impl QueryKey, set: ResultSet<T>) -> Arc<ResultSet<T>> {
    let set = Arc::new(set);
    let erased: Arc<dyn Any + Send + Sync> = set.clone();
    self.entries().insert(key.key(), erased);
    set
  }

  /// Remove every entry whose key matches `predicate`. Returns how many were removed.
  pub fn invalidate(&self, predicate: impl Fn(&str) -> bool) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|key, _| !predicate(key));
    before - entries.len()
  }

  /// Remove every entry whose key starts with `prefix`.
  pub fn invalidate_prefix(&self, prefix: &str) -> usize {
    let removed = self.invalidate(|key| key.starts_with(prefix));
    tracing::debug!(prefix, removed, "invalidated cache entries");
    removed
  }

  pub fn clear(&self) {
    self.entries().clear();
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.entries().contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if present, return it without calling `fetcher`
  /// 2. Otherwise fetch from the network
  /// 3. Store the result only if the fetch succeeded
  ///
  /// Concurrent misses for the same key are not deduplicated; the last one
  /// to finish wins.
  pub async fn fetch_through<T, K, F, Fut>(
    &self,
    key: &K,
    fetcher: F,
  ) -> Result<Arc<ResultSet<T>>, ClientError>
  where
    T: Cacheable,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ResultSet<T>, ClientError>>,
  {
    if let Some(cached) = self.get::<T>(key) {
      tracing::debug!(query = %key.description(), "cache hit");
      return Ok(cached);
    }

    tracing::debug!(query = %key.description(), "cache miss");
    let fresh = fetcher().await?;
    Ok(self.put(key, fresh))
  }
}

impl std::fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheStore")
      .field("entries", &self.len())
      .finish()
  }
}
