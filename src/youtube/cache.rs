//! Caching implementations for video platform types.

use crate::cache::{CacheStore, Cacheable, QueryKey};
use crate::pagination::PaginationEngine;

use super::types::{Comment, SourceType, Video};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Video {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "video"
  }
}

impl Cacheable for Comment {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "comment"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Query key types for video API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum YoutubeQueryKey {
  /// Videos of a channel or playlist
  Videos {
    source_type: SourceType,
    source_id: String,
  },
  /// One page of comment threads on a video
  Comments {
    video_id: String,
    page_token: Option<String>,
  },
}

impl QueryKey for YoutubeQueryKey {
  fn key(&self) -> String {
    match self {
      Self::Videos {
        source_type,
        source_id,
      } => format!("{}:{}", source_type, source_id),
      Self::Comments {
        video_id,
        page_token,
      } => format!("{}:{}", video_id, page_token.as_deref().unwrap_or("first")),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::Videos {
        source_type,
        source_id,
      } => format!("{} videos {}", source_type, source_id),
      Self::Comments {
        video_id,
        page_token: None,
      } => format!("comments on {}", video_id),
      Self::Comments {
        video_id,
        page_token: Some(token),
      } => format!("comments on {} from {}", video_id, token),
    }
  }
}

/// Prefix shared by every comment page of a video.
pub fn comment_prefix(video_id: &str) -> String {
  format!("{}:", video_id)
}

/// Drop every cached comment page of a video, and its accumulated thread.
pub(crate) fn purge_comments(
  cache: &CacheStore,
  threads: &PaginationEngine<Comment>,
  video_id: &str,
) {
  let removed = cache.invalidate_prefix(&comment_prefix(video_id));
  threads.forget(video_id);
  tracing::debug!(video_id, removed, "purged cached comments");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_video_listing_key() {
    let key = YoutubeQueryKey::Videos {
      source_type: SourceType::Playlist,
      source_id: "PL123".to_string(),
    };
    assert_eq!(key.key(), "playlist:PL123");
  }

  #[test]
  fn test_comment_page_keys() {
    let first = YoutubeQueryKey::Comments {
      video_id: "v1".to_string(),
      page_token: None,
    };
    let second = YoutubeQueryKey::Comments {
      video_id: "v1".to_string(),
      page_token: Some("CAE".to_string()),
    };
    assert_eq!(first.key(), "v1:first");
    assert_eq!(second.key(), "v1:CAE");
    assert!(first.key().starts_with(&comment_prefix("v1")));
    assert!(!first.key().starts_with(&comment_prefix("v")));
  }
}
