//! Domain types for the video platform.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a video listing comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
  Channel,
  Playlist,
}

impl SourceType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Channel => "channel",
      Self::Playlist => "playlist",
    }
  }
}

impl fmt::Display for SourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SourceType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "channel" => Ok(Self::Channel),
      "playlist" => Ok(Self::Playlist),
      other => Err(format!("unknown source type '{}', expected channel or playlist", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
  Like,
  Dislike,
  /// Withdraw an earlier rating
  None,
}

impl Rating {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Like => "like",
      Self::Dislike => "dislike",
      Self::None => "none",
    }
  }
}

impl fmt::Display for Rating {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Rating {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "like" => Ok(Self::Like),
      "dislike" => Ok(Self::Dislike),
      "none" => Ok(Self::None),
      other => Err(format!("unknown rating '{}', expected like, dislike or none", other)),
    }
  }
}

/// A video in a channel or playlist listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Video {
  pub id: String,
  pub title: String,
  pub description: String,
  pub thumbnail_url: String,
  pub published_at: String,
}

/// A top-level comment or a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
  pub id: String,
  pub author: String,
  pub text: String,
  pub published_at: String,
  pub parent_id: Option<String>,
}
