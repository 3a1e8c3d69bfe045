//! Video listings and ratings.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use super::api_types::{ApiVideoItem, ApiVideoList};
use super::cache::{purge_comments, YoutubeQueryKey};
use super::types::{Comment, Rating, SourceType, Video};
use crate::cache::{CacheStore, ResultSet};
use crate::error::ClientError;
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::pagination::PaginationEngine;
use crate::session::AuthManager;
use crate::status::{Snapshot, Status};

const LISTING_PATH: &str = "/api/youtube";
const RATE_PATH: &str = "/api/youtube/rate";

/// Lists channel and playlist videos through the response cache, and rates
/// videos for a signed-in user.
#[derive(Clone)]
pub struct VideoFacade {
  gateway: Arc<dyn RemoteGateway>,
  cache: CacheStore,
  auth: AuthManager,
  threads: PaginationEngine<Comment>,
  status: Status<Arc<ResultSet<Video>>>,
}

impl VideoFacade {
  pub fn new(
    gateway: Arc<dyn RemoteGateway>,
    cache: CacheStore,
    auth: AuthManager,
    threads: PaginationEngine<Comment>,
  ) -> Self {
    Self {
      gateway,
      cache,
      auth,
      threads,
      status: Status::new(),
    }
  }

  pub fn snapshot(&self) -> Snapshot<Arc<ResultSet<Video>>> {
    self.status.snapshot()
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  /// Videos of a channel or playlist.
  ///
  /// Served from the cache when this source was listed before, including
  /// when it had no videos.
  #[instrument(skip(self))]
  pub async fn list_videos(
    &self,
    source_type: SourceType,
    source_id: &str,
  ) -> Result<Arc<ResultSet<Video>>, ClientError> {
    let attempt = self.status.begin();
    let result = self.fetch_videos(source_type, source_id).await;
    attempt.finish(&result);
    result
  }

  async fn fetch_videos(
    &self,
    source_type: SourceType,
    source_id: &str,
  ) -> Result<Arc<ResultSet<Video>>, ClientError> {
    let source_id = source_id.trim();
    if source_id.is_empty() {
      return Err(ClientError::missing_target("a channel or playlist id"));
    }

    let key = YoutubeQueryKey::Videos {
      source_type,
      source_id: source_id.to_string(),
    };
    let gateway = &self.gateway;
    self
      .cache
      .fetch_through(&key, || async move {
        let request = GatewayRequest::get(LISTING_PATH)
          .query("type", source_type)
          .query("id", source_id);
        let response = gateway.request(request).await?;
        parse_video_list(response)
      })
      .await
  }

  /// Rate a video. Requires a signed-in session.
  ///
  /// On success every cached comment page of the video is dropped before
  /// returning; on failure the cache is left alone.
  #[instrument(skip(self))]
  pub async fn rate_video(&self, video_id: &str, rating: Rating) -> Result<(), ClientError> {
    let mut attempt = self.status.begin();
    let result = self.send_rating(video_id, rating).await;
    if let Err(e) = &result {
      attempt.fail(e);
    }
    result
  }

  async fn send_rating(&self, video_id: &str, rating: Rating) -> Result<(), ClientError> {
    let video_id = video_id.trim();
    if video_id.is_empty() {
      return Err(ClientError::missing_target("a video id"));
    }
    let token = self.auth.bearer_token()?;

    let request = GatewayRequest::post(RATE_PATH)
      .bearer(token.secret())
      .json(json!({ "videoId": video_id, "rating": rating.as_str() }));
    self.gateway.request(request).await?;

    purge_comments(&self.cache, &self.threads, video_id);
    tracing::info!(video_id, %rating, "rated video");
    Ok(())
  }

  /// Forget every cached listing and the last result.
  pub fn reset(&self) {
    let removed = self.cache.invalidate(|key| {
      [SourceType::Channel, SourceType::Playlist]
        .iter()
        .any(|source| key.starts_with(&format!("{}:", source)))
    });
    self.status.reset();
    tracing::debug!(removed, "reset video listings");
  }
}

/// Map a listing response onto videos.
///
/// Items that match no known shape, or carry no id, are dropped.
fn parse_video_list(response: Value) -> Result<ResultSet<Video>, ClientError> {
  let list: ApiVideoList = serde_json::from_value(response)
    .map_err(|e| ClientError::Shape(format!("video listing: {}", e)))?;

  let mut videos = Vec::with_capacity(list.items.len());
  for item in list.items {
    match ApiVideoItem::classify(item) {
      Ok(item) => {
        let shape = item.shape();
        match item.into_video() {
          Some(video) => videos.push(video),
          None => tracing::warn!(shape, "dropping video item without an id"),
        }
      }
      Err(unrecognized) => {
        tracing::warn!(fields = ?unrecognized.fields, "dropping unrecognized video item");
      }
    }
  }

  Ok(ResultSet::new(videos, list.next_page_token))
}
