//! Archived search results, stored server-side under a document key.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::cache::{CacheStore, QueryKey, ResultSet};
use crate::error::ClientError;
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::search::SearchItem;
use crate::status::{Snapshot, Status};

const DOCUMENT_PATH: &str = "/api/firebase/search";
/// Video ids never contain a slash, so comment purges cannot reach these keys.
const DOCUMENT_PREFIX: &str = "archive/";

/// Cache identity of one archived document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentQueryKey {
  key: String,
}

impl DocumentQueryKey {
  pub fn new(key: &str) -> Self {
    Self {
      key: key.to_string(),
    }
  }
}

impl QueryKey for DocumentQueryKey {
  fn key(&self) -> String {
    format!("{}{}", DOCUMENT_PREFIX, self.key)
  }

  fn description(&self) -> String {
    format!("archived results {}", self.key)
  }
}

/// One archived search run.
#[derive(Debug, Deserialize)]
struct ApiArchivedSearch {
  #[serde(default)]
  query: String,
  #[serde(default)]
  results: Vec<SearchItem>,
  #[serde(rename = "createdAt", default)]
  created_at: String,
}

#[derive(Clone)]
pub struct DocumentFacade {
  gateway: Arc<dyn RemoteGateway>,
  cache: CacheStore,
  status: Status<Arc<ResultSet<SearchItem>>>,
}

impl DocumentFacade {
  pub fn new(gateway: Arc<dyn RemoteGateway>, cache: CacheStore) -> Self {
    Self {
      gateway,
      cache,
      status: Status::new(),
    }
  }

  pub fn snapshot(&self) -> Snapshot<Arc<ResultSet<SearchItem>>> {
    self.status.snapshot()
  }

  /// The latest results archived under `key`, empty when nothing was archived.
  #[instrument(skip(self))]
  pub async fn fetch_cached_results(
    &self,
    key: &str,
  ) -> Result<Arc<ResultSet<SearchItem>>, ClientError> {
    let attempt = self.status.begin();
    let result = self.fetch(key).await;
    attempt.finish(&result);
    result
  }

  /// Like [`Self::fetch_cached_results`], but always asks the server.
  #[instrument(skip(self))]
  pub async fn refresh(&self, key: &str) -> Result<Arc<ResultSet<SearchItem>>, ClientError> {
    let doc_key = DocumentQueryKey::new(key.trim()).key();
    self.cache.invalidate(|k| k == doc_key);
    self.fetch_cached_results(key).await
  }

  /// Forget every cached document and the last result.
  pub fn reset(&self) {
    self.cache.invalidate_prefix(DOCUMENT_PREFIX);
    self.status.reset();
  }

  async fn fetch(&self, key: &str) -> Result<Arc<ResultSet<SearchItem>>, ClientError> {
    let key = key.trim();
    if key.is_empty() {
      return Err(ClientError::missing_target("a document key"));
    }

    let gateway = &self.gateway;
    self
      .cache
      .fetch_through(&DocumentQueryKey::new(key), || async move {
        let path = format!("{}/{}", DOCUMENT_PATH, encode_segment(key));
        let response = gateway.request(GatewayRequest::get(path)).await?;
        latest_results(key, response)
      })
      .await
  }
}

/// Percent-encode a single path segment.
fn encode_segment(segment: &str) -> String {
  url::form_urlencoded::byte_serialize(segment.as_bytes())
    .collect::<String>()
    .replace('+', "%20")
}

fn latest_results(key: &str, response: Value) -> Result<ResultSet<SearchItem>, ClientError> {
  let records: Vec<ApiArchivedSearch> = serde_json::from_value(response)
    .map_err(|e| ClientError::Shape(format!("archived results: {}", e)))?;

  match records
    .into_iter()
    .max_by(|a, b| a.created_at.cmp(&b.created_at))
  {
    Some(latest) => {
      tracing::debug!(key, query = %latest.query, created_at = %latest.created_at, "using latest archive");
      Ok(ResultSet::new(latest.results, None))
    }
    None => Ok(ResultSet::empty()),
  }
}
