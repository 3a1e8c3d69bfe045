//! Serde-deserializable types matching the search API responses.

use serde::Deserialize;

use super::types::SearchItem;

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(rename = "lastBuildDate")]
  pub last_build_date: Option<String>,
  pub total: Option<u64>,
  pub start: Option<u32>,
  pub display: Option<u32>,
  pub items: Vec<SearchItem>,
}
