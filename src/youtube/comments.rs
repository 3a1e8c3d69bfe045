//! Comment threads: cached pages, accumulated threads and writes.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

use super::api_types::ApiCommentThreadList;
use super::cache::{purge_comments, YoutubeQueryKey};
use super::types::Comment;
use crate::cache::{CacheStore, ResultSet};
use crate::error::{ClientError, ErrorCode};
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::pagination::{Accumulated, Cursor, LoadMore, Page, PaginationEngine};
use crate::session::AuthManager;
use crate::status::{Snapshot, Status};

const THREADS_PATH: &str = "/api/youtube";
const POST_THREAD_PATH: &str = "/api/youtube/commentThreads";
const POST_REPLY_PATH: &str = "/api/youtube/comments";

#[derive(Clone)]
pub struct CommentFacade {
  gateway: Arc<dyn RemoteGateway>,
  cache: CacheStore,
  auth: AuthManager,
  threads: PaginationEngine<Comment>,
  status: Status<Arc<ResultSet<Comment>>>,
}

impl CommentFacade {
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

  pub fn snapshot(&self) -> Snapshot<Arc<ResultSet<Comment>>> {
    self.status.snapshot()
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  /// One page of comments on a video, the first one when `page_token` is `None`.
  ///
  /// A response without an `items` array fails with
  /// [`ClientError::Shape`] and is not cached.
  #[instrument(skip(self))]
  pub async fn list_comments(
    &self,
    video_id: &str,
    page_token: Option<&str>,
  ) -> Result<Arc<ResultSet<Comment>>, ClientError> {
    let attempt = self.status.begin();
    let result = self.fetch_page(video_id, page_token).await;
    attempt.finish(&result);
    result
  }

  async fn fetch_page(
    &self,
    video_id: &str,
    page_token: Option<&str>,
  ) -> Result<Arc<ResultSet<Comment>>, ClientError> {
    let video_id = required(video_id, "a video id")?;
    let page_token = page_token.map(str::trim).filter(|t| !t.is_empty());

    let key = YoutubeQueryKey::Comments {
      video_id: video_id.to_string(),
      page_token: page_token.map(String::from),
    };
    let gateway = &self.gateway;
    self
      .cache
      .fetch_through(&key, || async move {
        let mut request = GatewayRequest::get(THREADS_PATH).query("videoId", video_id);
        if let Some(token) = page_token {
          request = request.query("pageToken", token);
        }
        let response = gateway.request(request).await?;
        parse_comment_threads(response)
      })
      .await
  }

  /// Load the first page of a video's comments and start accumulating.
  ///
  /// Restarting discards whatever was accumulated before.
  #[instrument(skip(self))]
  pub async fn open_thread(&self, video_id: &str) -> Result<Accumulated<Comment>, ClientError> {
    let attempt = self.status.begin();
    let result = self.fetch_page(video_id, None).await;
    attempt.finish(&result);
    let first = result?;
    Ok(self.threads.start(video_id.trim(), to_page(&first)))
  }

  /// Append the next page to an opened thread.
  ///
  /// Does nothing while another load for the same video is running, or once
  /// the thread is exhausted.
  #[instrument(skip(self))]
  pub async fn load_more_comments(
    &self,
    video_id: &str,
  ) -> Result<LoadMore<Comment>, ClientError> {
    let video_id = video_id.trim();
    let mut attempt = self.status.begin();
    let result = self
      .threads
      .load_more(video_id, |cursor| async move {
        let token = match cursor {
          Cursor::Token(token) => token,
          Cursor::Offset { .. } => {
            return Err(ClientError::Shape(
              "comment threads page by token".to_string(),
            ))
          }
        };
        let page = self.fetch_page(video_id, Some(&token)).await?;
        Ok(to_page(&page))
      })
      .await;

    match &result {
      Ok(LoadMore::Merged(thread)) => {
        tracing::debug!(video_id, loaded = thread.display, "loaded more comments")
      }
      Ok(_) => {}
      Err(e) => attempt.fail(e),
    }
    result
  }

  pub fn has_more_comments(&self, video_id: &str) -> bool {
    self.threads.has_more(video_id.trim())
  }

  pub fn thread(&self, video_id: &str) -> Option<Accumulated<Comment>> {
    self.threads.accumulated(video_id.trim())
  }

  /// Post a top-level comment. Requires a signed-in session.
  ///
  /// On success every cached comment page of the video is dropped before
  /// returning.
  #[instrument(skip(self, text))]
  pub async fn post_comment(&self, video_id: &str, text: &str) -> Result<(), ClientError> {
    let mut attempt = self.status.begin();
    let result = self.send_comment(video_id, None, text).await;
    if let Err(e) = &result {
      attempt.fail(e);
    }
    result
  }

  /// Reply to a comment on `video_id`. Requires a signed-in session.
  #[instrument(skip(self, text))]
  pub async fn reply_to_comment(
    &self,
    video_id: &str,
    parent_id: &str,
    text: &str,
  ) -> Result<(), ClientError> {
    let mut attempt = self.status.begin();
    let result = match required(parent_id, "a parent comment id") {
      Ok(parent_id) => self.send_comment(video_id, Some(parent_id), text).await,
      Err(e) => Err(e),
    };
    if let Err(e) = &result {
      attempt.fail(e);
    }
    result
  }

  async fn send_comment(
    &self,
    video_id: &str,
    parent_id: Option<&str>,
    text: &str,
  ) -> Result<(), ClientError> {
    let video_id = required(video_id, "a video id")?;
    let text = text.trim();
    if text.is_empty() {
      return Err(ClientError::validation(
        ErrorCode::MissingText,
        "comment text is required",
      ));
    }
    let token = self.auth.bearer_token()?;

    let request = match parent_id {
      Some(parent_id) => {
        GatewayRequest::post(POST_REPLY_PATH).json(json!({ "parentId": parent_id, "text": text }))
      }
      None => {
        GatewayRequest::post(POST_THREAD_PATH).json(json!({ "videoId": video_id, "text": text }))
      }
    };
    self
      .gateway
      .request(request.bearer(token.secret()))
      .await?;

    purge_comments(&self.cache, &self.threads, video_id);
    tracing::info!(video_id, reply = parent_id.is_some(), "posted comment");
    Ok(())
  }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, ClientError> {
  let value = value.trim();
  if value.is_empty() {
    return Err(ClientError::missing_target(what));
  }
  Ok(value)
}

fn to_page(set: &ResultSet<Comment>) -> Page<Comment> {
  Page {
    items: set.items.clone(),
    next: set.next_page_token.clone().map(Cursor::Token),
    total: None,
  }
}

/// Map a comment-thread response onto flat comments.
///
/// Unlike video listings this is strict: any mismatch means the upstream
/// shape changed, which must not be mistaken for "no comments".
fn parse_comment_threads(response: Value) -> Result<ResultSet<Comment>, ClientError> {
  let list: ApiCommentThreadList = serde_json::from_value(response)
    .map_err(|e| ClientError::Shape(format!("comment threads: {}", e)))?;
  let comments = list.items.into_iter().map(Comment::from).collect();
  Ok(ResultSet::new(comments, list.next_page_token))
}
