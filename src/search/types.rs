//! Domain types for blog and news search.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::Cacheable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
  Blog,
  News,
}

impl SearchKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Blog => "blog",
      Self::News => "news",
    }
  }

  pub(crate) fn path(self) -> &'static str {
    match self {
      Self::Blog => "/api/naver/blog/search",
      Self::News => "/api/naver/news/search",
    }
  }
}

impl fmt::Display for SearchKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A blog post or news article. Blog-only and news-only fields are optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
  pub title: String,
  pub link: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "bloggername", default, skip_serializing_if = "Option::is_none")]
  pub blogger_name: Option<String>,
  #[serde(rename = "bloggerlink", default, skip_serializing_if = "Option::is_none")]
  pub blogger_link: Option<String>,
  #[serde(rename = "postdate", default, skip_serializing_if = "Option::is_none")]
  pub post_date: Option<String>,
  #[serde(rename = "pubDate", default, skip_serializing_if = "Option::is_none")]
  pub pub_date: Option<String>,
}

impl Cacheable for SearchItem {
  fn cache_key(&self) -> String {
    self.link.clone()
  }

  fn entity_type() -> &'static str {
    "search_item"
  }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
  pub kind: SearchKind,
  pub query: String,
  pub items: Vec<SearchItem>,
  /// Matches reported by the upstream, across all pages
  pub total: u64,
  pub start: u32,
  pub display: u32,
  pub last_build_date: Option<String>,
}

/// A successful search, with or without matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
  Results(SearchResults),
  NoResults { kind: SearchKind, query: String },
}

impl SearchOutcome {
  pub fn items(&self) -> &[SearchItem] {
    match self {
      Self::Results(results) => &results.items,
      Self::NoResults { .. } => &[],
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Self::NoResults { .. })
  }
}
