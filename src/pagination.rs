//! "Load more" pagination over a logical query.
//!
//! The engine keeps one accumulated result per query identity. Loading the
//! next page appends its new items after the existing ones, advances the
//! cursor to whatever the server handed back, and recomputes the displayed
//! count from the accumulated length. Accumulated items are never reordered
//! or removed by a load.
//!
//! Termination is defensive: an empty page, or a page that adds nothing new,
//! ends pagination even if the upstream total claims otherwise.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::Cacheable;
use crate::error::ClientError;

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
  /// Opaque upstream continuation token
  Token(String),
  /// 1-based offset plus page size
  Offset { start: u32, display: u32 },
}

/// One page as returned by an upstream call.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub next: Option<Cursor>,
  /// Total reported by the upstream, when it reports one
  pub total: Option<u64>,
}

/// Everything loaded so far for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulated<T> {
  pub items: Vec<T>,
  pub cursor: Option<Cursor>,
  pub total: Option<u64>,
  /// Number of accumulated items, as shown to the user
  pub display: usize,
  #[serde(skip)]
  exhausted: bool,
  #[serde(skip)]
  generation: u64,
}

impl<T> Accumulated<T> {
  /// `accumulated < total`, unless pagination was ended early or there is no cursor.
  pub fn has_more(&self) -> bool {
    if self.exhausted || self.cursor.is_none() {
      return false;
    }
    match self.total {
      Some(total) => (self.items.len() as u64) < total,
      None => true,
    }
  }
}

/// Outcome of [`PaginationEngine::load_more`].
#[derive(Debug, Clone, PartialEq)]
pub enum LoadMore<T> {
  /// A page was fetched and merged
  Merged(Accumulated<T>),
  /// A fetch for this query is already running; nothing was issued
  InFlight,
  /// Nothing left to load (or the query was never started); nothing was issued
  Exhausted,
  /// The query was restarted while the page was loading; the page was discarded
  Superseded,
}

#[derive(Debug)]
struct EngineState<T> {
  queries: HashMap<String, Accumulated<T>>,
  in_flight: HashSet<String>,
  next_generation: u64,
}

/// Accumulates pages per query identity.
#[derive(Debug)]
pub struct PaginationEngine<T> {
  state: Arc<Mutex<EngineState<T>>>,
}

impl<T> Clone for PaginationEngine<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T> Default for PaginationEngine<T> {
  fn default() -> Self {
    Self {
      state: Arc::new(Mutex::new(EngineState {
        queries: HashMap::new(),
        in_flight: HashSet::new(),
        next_generation: 0,
      })),
    }
  }
}

/// Clears the in-flight mark when the load finishes, fails or is dropped.
struct InFlightGuard<'a, T> {
  engine: &'a PaginationEngine<T>,
  query: String,
}

impl<T> Drop for InFlightGuard<'_, T> {
  fn drop(&mut self) {
    self.engine.state().in_flight.remove(&self.query);
  }
}

impl<T> PaginationEngine<T> {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, EngineState<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn has_more(&self, query: &str) -> bool {
    self
      .state()
      .queries
      .get(query)
      .is_some_and(Accumulated::has_more)
  }

  pub fn is_loading(&self, query: &str) -> bool {
    self.state().in_flight.contains(query)
  }

  /// Drop the accumulated state for one query.
  pub fn forget(&self, query: &str) {
    self.state().queries.remove(query);
  }

  pub fn clear(&self) {
    self.state().queries.clear();
  }
}

impl<T: Cacheable> PaginationEngine<T> {
  /// Start (or restart) a query from its first page.
  pub fn start(&self, query: &str, first: Page<T>) -> Accumulated<T> {
    let mut state = self.state();
    let generation = state.next_generation;
    state.next_generation += 1;

    let mut accumulated = Accumulated {
      items: Vec::with_capacity(first.items.len()),
      cursor: None,
      total: None,
      display: 0,
      exhausted: false,
      generation,
    };
    merge(&mut accumulated, first);

    state
      .queries
      .insert(query.to_string(), accumulated.clone());
    accumulated
  }

  pub fn accumulated(&self, query: &str) -> Option<Accumulated<T>> {
    self.state().queries.get(query).cloned()
  }

  /// Fetch the page after the current cursor and merge it.
  ///
  /// Rejected without calling `fetch` while another load for the same query
  /// is running, or when there is nothing more to load. On error the
  /// accumulated state is left untouched.
  pub async fn load_more<F, Fut>(&self, query: &str, fetch: F) -> Result<LoadMore<T>, ClientError>
  where
    F: FnOnce(Cursor) -> Fut,
    Fut: Future<Output = Result<Page<T>, ClientError>>,
  {
    let (cursor, generation) = {
      let mut state = self.state();
      if state.in_flight.contains(query) {
        tracing::debug!(query, "page load already in flight");
        return Ok(LoadMore::InFlight);
      }
      let Some(current) = state.queries.get(query) else {
        return Ok(LoadMore::Exhausted);
      };
      if !current.has_more() {
        return Ok(LoadMore::Exhausted);
      }
      let Some(cursor) = current.cursor.clone() else {
        return Ok(LoadMore::Exhausted);
      };
      let generation = current.generation;
      state.in_flight.insert(query.to_string());
      (cursor, generation)
    };
    let _guard = InFlightGuard {
      engine: self,
      query: query.to_string(),
    };

    let page = fetch(cursor).await?;

    let mut state = self.state();
    let Some(current) = state.queries.get_mut(query) else {
      return Ok(LoadMore::Superseded);
    };
    if current.generation != generation {
      tracing::debug!(query, "query restarted while loading, dropping page");
      return Ok(LoadMore::Superseded);
    }
    merge(current, page);
    Ok(LoadMore::Merged(current.clone()))
  }
}

fn merge<T: Cacheable>(accumulated: &mut Accumulated<T>, page: Page<T>) {
  let page_len = page.items.len();
  let mut seen: HashSet<String> = accumulated.items.iter().map(Cacheable::cache_key).collect();
  let before = accumulated.items.len();

  for item in page.items {
    if seen.insert(item.cache_key()) {
      accumulated.items.push(item);
    }
  }

  let added = accumulated.items.len() - before;
  accumulated.cursor = page.next;
  if page.total.is_some() {
    accumulated.total = page.total;
  }
  accumulated.display = accumulated.items.len();

  if page_len == 0 || (before > 0 && added == 0) {
    if accumulated.cursor.is_some() {
      tracing::debug!(entity = T::entity_type(), "page added nothing, ending pagination");
    }
    accumulated.exhausted = true;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Debug, Clone, PartialEq)]
  struct Item(u32);

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      self.0.to_string()
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  fn page(range: std::ops::Range<u32>, next: Option<u32>, total: u64) -> Page<Item> {
    Page {
      items: range.map(Item).collect(),
      next: next.map(|start| Cursor::Offset { start, display: 15 }),
      total: Some(total),
    }
  }

  #[tokio::test]
  async fn test_load_more_appends_in_order() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 50));

    let result = engine
      .load_more("cats", |cursor| async move {
        assert_eq!(cursor, Cursor::Offset { start: 16, display: 15 });
        Ok(page(15..30, Some(31), 50))
      })
      .await
      .unwrap();

    let LoadMore::Merged(acc) = result else {
      panic!("expected merge");
    };
    assert_eq!(acc.items, (0..30).map(Item).collect::<Vec<_>>());
    assert_eq!(acc.display, 30);
    assert!(acc.has_more());
  }

  #[tokio::test]
  async fn test_has_more_false_once_total_reached() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 20));
    engine
      .load_more("cats", |_| async { Ok(page(15..20, Some(21), 20)) })
      .await
      .unwrap();

    assert!(!engine.has_more("cats"));
    let calls = AtomicUsize::new(0);
    let result = engine
      .load_more("cats", |_| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(page(20..25, None, 20))
      })
      .await
      .unwrap();
    assert_eq!(result, LoadMore::Exhausted);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_empty_page_with_cursor_terminates() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 500));
    engine
      .load_more("cats", |_| async { Ok(page(0..0, Some(31), 500)) })
      .await
      .unwrap();

    assert!(!engine.has_more("cats"));
    assert_eq!(engine.accumulated("cats").unwrap().items.len(), 15);
  }

  #[tokio::test]
  async fn test_duplicate_page_is_deduplicated_and_terminates() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 500));
    let result = engine
      .load_more("cats", |_| async { Ok(page(10..15, Some(31), 500)) })
      .await
      .unwrap();

    let LoadMore::Merged(acc) = result else {
      panic!("expected merge");
    };
    assert_eq!(acc.items.len(), 15);
    assert!(!acc.has_more());
  }

  #[tokio::test]
  async fn test_overlapping_load_is_rejected() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 50));
    let calls = AtomicUsize::new(0);

    let slow = engine.load_more("cats", |_| async {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::task::yield_now().await;
      Ok(page(15..30, Some(31), 50))
    });
    let overlapping = engine.load_more("cats", |_| async {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok(page(15..30, Some(31), 50))
    });

    let (first, second) = futures::join!(slow, overlapping);
    assert!(matches!(first.unwrap(), LoadMore::Merged(_)));
    assert_eq!(second.unwrap(), LoadMore::InFlight);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!engine.is_loading("cats"));
  }

  #[tokio::test]
  async fn test_failed_load_leaves_state_and_clears_in_flight() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 50));
    let result = engine
      .load_more("cats", |_| async { Err(ClientError::Shape("bad page".into())) })
      .await;

    assert!(result.is_err());
    assert!(!engine.is_loading("cats"));
    let acc = engine.accumulated("cats").unwrap();
    assert_eq!(acc.items.len(), 15);
    assert!(acc.has_more());
  }

  #[tokio::test]
  async fn test_restart_discards_stale_page() {
    let engine = PaginationEngine::new();
    engine.start("cats", page(0..15, Some(16), 50));

    let result = engine
      .load_more("cats", |_| {
        engine.start("cats", page(100..105, Some(6), 50));
        async { Ok(page(15..30, Some(31), 50)) }
      })
      .await
      .unwrap();

    assert_eq!(result, LoadMore::Superseded);
    let acc = engine.accumulated("cats").unwrap();
    assert_eq!(acc.items, (100..105).map(Item).collect::<Vec<_>>());
  }

  #[tokio::test]
  async fn test_unknown_query_is_exhausted() {
    let engine: PaginationEngine<Item> = PaginationEngine::new();
    let result = engine
      .load_more("dogs", |_| async { Ok(page(0..1, None, 1)) })
      .await
      .unwrap();
    assert_eq!(result, LoadMore::Exhausted);
    assert!(!engine.has_more("dogs"));
  }

  #[test]
  fn test_missing_total_falls_back_to_cursor() {
    let engine = PaginationEngine::new();
    engine.start(
      "v1",
      Page {
        items: vec![Item(1)],
        next: Some(Cursor::Token("CAE".into())),
        total: None,
      },
    );
    assert!(engine.has_more("v1"));
    engine.forget("v1");
    assert!(!engine.has_more("v1"));
  }
}
