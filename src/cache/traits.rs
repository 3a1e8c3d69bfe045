//! Core traits and types for the caching system.

use serde::Serialize;

/// Trait for items that can be cached and accumulated across pages.
pub trait Cacheable: Clone + Send + Sync + 'static {
  /// Unique identifier for this item (e.g., video id, comment id, article link)
  fn cache_key(&self) -> String;

  /// Item type name used in log output (e.g., "video", "comment")
  fn entity_type() -> &'static str;
}

/// Identity of a cacheable request.
///
/// Implementations must be deterministic: equal inputs produce equal keys.
pub trait QueryKey {
  /// The derived cache key (e.g. `playlist:PL123`, `v1:first`)
  fn key(&self) -> String;

  /// Human-readable description for log output.
  fn description(&self) -> String;
}

/// Ordered items plus the upstream continuation token, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet<T> {
  pub items: Vec<T>,
  pub next_page_token: Option<String>,
}

impl<T> ResultSet<T> {
  pub fn new(items: Vec<T>, next_page_token: Option<String>) -> Self {
    Self {
      items,
      next_page_token,
    }
  }

  pub fn empty() -> Self {
    Self::new(Vec::new(), None)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}
