//! Serde-deserializable types matching the video API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;
use serde_json::Value;

use super::types::{Comment, Video};

// ============================================================================
// Video listings
// ============================================================================

/// Listing envelope. Items are kept raw so that one odd item does not fail
/// the whole page.
#[derive(Debug, Deserialize)]
pub struct ApiVideoList {
  pub items: Vec<Value>,
  #[serde(rename = "nextPageToken")]
  pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiSnippet {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub thumbnails: ApiThumbnails,
  #[serde(rename = "publishedAt", default)]
  pub published_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiThumbnails {
  pub medium: Option<ApiThumbnail>,
  pub default: Option<ApiThumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiThumbnail {
  pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchId {
  #[serde(rename = "videoId")]
  pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiContentDetails {
  #[serde(rename = "videoId")]
  pub video_id: String,
}

/// The shapes a listing item comes in.
///
/// Tried in order; a playlist item also has a string `id` (its own), so it
/// must be matched before the bare shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiVideoItem {
  /// `search` endpoint: `{id: {videoId}, snippet}`
  SearchResult {
    id: ApiSearchId,
    #[serde(default)]
    snippet: ApiSnippet,
  },
  /// `playlistItems` endpoint: `{contentDetails: {videoId}, snippet}`
  PlaylistItem {
    #[serde(rename = "contentDetails")]
    content_details: ApiContentDetails,
    #[serde(default)]
    snippet: ApiSnippet,
  },
  /// `videos` endpoint: `{id, snippet}`
  Bare {
    id: String,
    #[serde(default)]
    snippet: ApiSnippet,
  },
}

/// An item that matched none of the known shapes.
#[derive(Debug)]
pub struct UnrecognizedItem {
  /// Top-level field names, for the log line
  pub fields: Vec<String>,
}

impl ApiVideoItem {
  pub fn classify(value: Value) -> Result<Self, UnrecognizedItem> {
    let fields = match &value {
      Value::Object(map) => map.keys().cloned().collect(),
      _ => Vec::new(),
    };
    serde_json::from_value(value).map_err(|_| UnrecognizedItem { fields })
  }

  /// The shape name, for log output.
  pub fn shape(&self) -> &'static str {
    match self {
      Self::SearchResult { .. } => "search result",
      Self::PlaylistItem { .. } => "playlist item",
      Self::Bare { .. } => "bare id",
    }
  }

  /// Convert to a [`Video`]. `None` when the id is blank.
  pub fn into_video(self) -> Option<Video> {
    let (id, snippet) = match self {
      Self::SearchResult { id, snippet } => (id.video_id, snippet),
      Self::PlaylistItem {
        content_details,
        snippet,
      } => (content_details.video_id, snippet),
      Self::Bare { id, snippet } => (id, snippet),
    };
    if id.trim().is_empty() {
      return None;
    }

    let ApiSnippet {
      title,
      description,
      thumbnails,
      published_at,
    } = snippet;
    let thumbnail_url = thumbnails
      .medium
      .or(thumbnails.default)
      .map(|t| t.url)
      .unwrap_or_default();

    Some(Video {
      id,
      title,
      description,
      thumbnail_url,
      published_at,
    })
  }
}

// ============================================================================
// Comment threads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCommentThreadList {
  pub items: Vec<ApiCommentThread>,
  #[serde(rename = "nextPageToken")]
  pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommentThread {
  pub id: String,
  pub snippet: ApiCommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommentThreadSnippet {
  #[serde(rename = "topLevelComment")]
  pub top_level_comment: ApiComment,
}

#[derive(Debug, Deserialize)]
pub struct ApiComment {
  pub snippet: ApiCommentSnippet,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommentSnippet {
  #[serde(rename = "authorDisplayName", default)]
  pub author_display_name: String,
  #[serde(rename = "textDisplay", default)]
  pub text_display: String,
  #[serde(rename = "publishedAt", default)]
  pub published_at: String,
  #[serde(rename = "parentId")]
  pub parent_id: Option<String>,
}

impl From<ApiCommentThread> for Comment {
  fn from(thread: ApiCommentThread) -> Self {
    let snippet = thread.snippet.top_level_comment.snippet;
    Self {
      id: thread.id,
      author: snippet.author_display_name,
      text: snippet.text_display,
      published_at: snippet.published_at,
      parent_id: snippet.parent_id,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_classify_each_shape() {
    let search = ApiVideoItem::classify(json!({
      "id": { "kind": "youtube#video", "videoId": "s1" },
      "snippet": { "title": "Search", "thumbnails": { "medium": { "url": "http://img/m.jpg" } } }
    }))
    .unwrap();
    assert_eq!(search.shape(), "search result");
    let video = search.into_video().unwrap();
    assert_eq!(video.id, "s1");
    assert_eq!(video.thumbnail_url, "http://img/m.jpg");

    let playlist = ApiVideoItem::classify(json!({
      "id": "UExpdGVt",
      "contentDetails": { "videoId": "p1" },
      "snippet": { "title": "Playlist" }
    }))
    .unwrap();
    assert_eq!(playlist.shape(), "playlist item");
    assert_eq!(playlist.into_video().unwrap().id, "p1");

    let bare = ApiVideoItem::classify(json!({ "id": "b1" })).unwrap();
    assert_eq!(bare.shape(), "bare id");
    let video = bare.into_video().unwrap();
    assert_eq!(video.id, "b1");
    assert_eq!(video.title, "");
  }

  #[test]
  fn test_channel_search_hit_is_unrecognized() {
    let err = ApiVideoItem::classify(json!({
      "id": { "kind": "youtube#channel", "channelId": "UC1" },
      "snippet": { "title": "A channel" }
    }))
    .unwrap_err();
    assert_eq!(err.fields, vec!["id".to_string(), "snippet".to_string()]);
  }

  #[test]
  fn test_blank_id_yields_no_video() {
    let item = ApiVideoItem::classify(json!({ "contentDetails": { "videoId": " " } })).unwrap();
    assert!(item.into_video().is_none());
  }

  #[test]
  fn test_comment_thread_flattens() {
    let list: ApiCommentThreadList = serde_json::from_value(json!({
      "items": [{
        "id": "c1",
        "snippet": { "topLevelComment": { "snippet": {
          "authorDisplayName": "Ann",
          "textDisplay": "Nice",
          "publishedAt": "2024-01-01T00:00:00Z"
        }}}
      }],
      "nextPageToken": "CAE"
    }))
    .unwrap();

    let comment = Comment::from(list.items.into_iter().next().unwrap());
    assert_eq!(comment.id, "c1");
    assert_eq!(comment.author, "Ann");
    assert_eq!(comment.text, "Nice");
    assert_eq!(list.next_page_token.as_deref(), Some("CAE"));
  }
}
