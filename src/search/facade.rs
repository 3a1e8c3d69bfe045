//! Blog and news search with history and "load more".

use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use super::api_types::ApiSearchResponse;
use super::history::{SearchHistory, SearchHistoryEntry};
use super::types::{SearchItem, SearchKind, SearchOutcome, SearchResults};
use crate::cache::{CacheStore, QueryKey};
use crate::documents::DocumentQueryKey;
use crate::error::ClientError;
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::pagination::{Accumulated, Cursor, LoadMore, Page, PaginationEngine};
use crate::status::{Snapshot, Status};

/// Largest page size the search API accepts.
pub const MAX_DISPLAY: u32 = 100;

/// Largest start offset the search API accepts.
const MAX_START: u32 = 1000;

/// Paged search over blogs and news.
///
/// Search results are not cached across calls; each query is tracked in the
/// shared [`SearchHistory`] and accumulated for "load more" instead.
#[derive(Clone)]
pub struct SearchFacade {
  gateway: Arc<dyn RemoteGateway>,
  cache: CacheStore,
  history: SearchHistory,
  pages: PaginationEngine<SearchItem>,
  status: Status<SearchOutcome>,
}

impl SearchFacade {
  pub fn new(gateway: Arc<dyn RemoteGateway>, cache: CacheStore, history: SearchHistory) -> Self {
    Self {
      gateway,
      cache,
      history,
      pages: PaginationEngine::new(),
      status: Status::new(),
    }
  }

  pub fn snapshot(&self) -> Snapshot<SearchOutcome> {
    self.status.snapshot()
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  pub fn history(&self) -> Vec<SearchHistoryEntry> {
    self.history.entries()
  }

  pub async fn search_blog(
    &self,
    query: &str,
    start: u32,
    display: u32,
  ) -> Result<SearchOutcome, ClientError> {
    self.search(SearchKind::Blog, query, start, display).await
  }

  pub async fn search_news(
    &self,
    query: &str,
    start: u32,
    display: u32,
  ) -> Result<SearchOutcome, ClientError> {
    self.search(SearchKind::News, query, start, display).await
  }

  /// Search blogs and have the server archive the results under `key`.
  ///
  /// The cached copy of that document is dropped once the search succeeds.
  pub async fn search_blog_archived(
    &self,
    key: &str,
    query: &str,
    start: u32,
    display: u32,
  ) -> Result<SearchOutcome, ClientError> {
    let key = key.trim();
    let outcome = self
      .run(SearchKind::Blog, query, start, display, Some(key))
      .await?;

    let doc_key = DocumentQueryKey::new(key).key();
    self.cache.invalidate(|k| k == doc_key);
    Ok(outcome)
  }

  /// Run a search, starting its accumulation afresh.
  ///
  /// `start` is clamped to at least 1 and `display` to `1..=100`. A blank
  /// query fails with `MISSING_QUERY` before any request is made.
  pub async fn search(
    &self,
    kind: SearchKind,
    query: &str,
    start: u32,
    display: u32,
  ) -> Result<SearchOutcome, ClientError> {
    self.run(kind, query, start, display, None).await
  }

  #[instrument(skip(self))]
  async fn run(
    &self,
    kind: SearchKind,
    query: &str,
    start: u32,
    page_size: u32,
    archive_key: Option<&str>,
  ) -> Result<SearchOutcome, ClientError> {
    let attempt = self.status.begin();
    let result = self.fetch(kind, query, start, page_size, archive_key).await;
    attempt.finish(&result);
    result
  }

  async fn fetch(
    &self,
    kind: SearchKind,
    query: &str,
    start: u32,
    page_size: u32,
    archive_key: Option<&str>,
  ) -> Result<SearchOutcome, ClientError> {
    if archive_key.is_some_and(str::is_empty) {
      return Err(ClientError::missing_target("a document key"));
    }
    let query = query.trim();
    if query.is_empty() {
      return Err(ClientError::missing_query());
    }
    let (start, display) = clamp(start, page_size);

    let results = self
      .request_page(kind, query, start, display, archive_key)
      .await?;
    self
      .history
      .record(query, results.items.len(), results.total);
    self.pages.start(&page_identity(kind, query), to_page(&results));

    tracing::info!(%kind, query, count = results.items.len(), total = results.total, "search finished");
    if results.items.is_empty() {
      return Ok(SearchOutcome::NoResults {
        kind,
        query: query.to_string(),
      });
    }
    Ok(SearchOutcome::Results(results))
  }

  async fn request_page(
    &self,
    kind: SearchKind,
    query: &str,
    start: u32,
    display: u32,
    archive_key: Option<&str>,
  ) -> Result<SearchResults, ClientError> {
    let mut request = GatewayRequest::get(kind.path())
      .query("query", query)
      .query("start", start)
      .query("display", display);
    if let Some(key) = archive_key {
      request = request.query("key", key);
    }
    let response = self.gateway.request(request).await?;
    parse_search_response(kind, query, start, display, response)
  }

  /// Append the next page of an earlier search.
  ///
  /// Does nothing while another load for the same search is running, or
  /// once every reported match has been loaded.
  #[instrument(skip(self))]
  pub async fn load_more(
    &self,
    kind: SearchKind,
    query: &str,
  ) -> Result<LoadMore<SearchItem>, ClientError> {
    let query = query.trim();
    let mut attempt = self.status.begin();
    let result = self
      .pages
      .load_more(&page_identity(kind, query), |cursor| async move {
        let (start, display) = match cursor {
          Cursor::Offset { start, display } => (start, display),
          Cursor::Token(_) => {
            return Err(ClientError::Shape("search pages by offset".to_string()))
          }
        };
        let results = self
          .request_page(kind, query, start, display, None)
          .await?;
        Ok(to_page(&results))
      })
      .await;

    match &result {
      Ok(LoadMore::Merged(accumulated)) => {
        self
          .history
          .record(query, accumulated.items.len(), accumulated.total.unwrap_or(0));
      }
      Ok(_) => {}
      Err(e) => attempt.fail(e),
    }
    result
  }

  pub fn has_more(&self, kind: SearchKind, query: &str) -> bool {
    self.pages.has_more(&page_identity(kind, query.trim()))
  }

  pub fn accumulated(&self, kind: SearchKind, query: &str) -> Option<Accumulated<SearchItem>> {
    self.pages.accumulated(&page_identity(kind, query.trim()))
  }

  /// Drop accumulated results and the last outcome. History is kept.
  pub fn reset(&self) {
    self.pages.clear();
    self.status.reset();
  }
}

fn clamp(start: u32, display: u32) -> (u32, u32) {
  (start.max(1), display.clamp(1, MAX_DISPLAY))
}

fn page_identity(kind: SearchKind, query: &str) -> String {
  format!("{}:{}", kind, query)
}

fn to_page(results: &SearchResults) -> Page<SearchItem> {
  let count = results.items.len() as u32;
  let next_start = results.start.saturating_add(count);
  let next = (count > 0 && u64::from(next_start) <= results.total && next_start <= MAX_START)
    .then_some(Cursor::Offset {
      start: next_start,
      display: results.display,
    });

  Page {
    items: results.items.clone(),
    next,
    total: Some(results.total),
  }
}

fn parse_search_response(
  kind: SearchKind,
  query: &str,
  start: u32,
  display: u32,
  response: Value,
) -> Result<SearchResults, ClientError> {
  let response: ApiSearchResponse = serde_json::from_value(response)
    .map_err(|e| ClientError::Shape(format!("{} search: {}", kind, e)))?;

  let total = response
    .total
    .unwrap_or(response.items.len() as u64);
  Ok(SearchResults {
    kind,
    query: query.to_string(),
    total,
    start: response.start.unwrap_or(start),
    // The page size we asked for, so the next page keeps it
    display: response.display.unwrap_or(display).max(display),
    last_build_date: response.last_build_date,
    items: response.items,
  })
}
