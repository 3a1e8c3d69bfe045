//! Error taxonomy shared by every facade.
//!
//! Facades return [`ClientError`] to their callers and record a normalized
//! [`ErrorInfo`] on their status, so the presentation layer only ever sees a
//! `{message, code}` pair.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  MissingQuery,
  MissingTarget,
  MissingText,
  MissingCode,
  OauthNotConfigured,
  AlreadyAuthenticated,
  Transport,
  Shape,
  AuthRequired,
  AuthFailed,
  Storage,
}

impl ErrorCode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::MissingQuery => "MISSING_QUERY",
      Self::MissingTarget => "MISSING_TARGET",
      Self::MissingText => "MISSING_TEXT",
      Self::MissingCode => "MISSING_CODE",
      Self::OauthNotConfigured => "OAUTH_NOT_CONFIGURED",
      Self::AlreadyAuthenticated => "ALREADY_AUTHENTICATED",
      Self::Transport => "TRANSPORT",
      Self::Shape => "SHAPE",
      Self::AuthRequired => "AUTH_REQUIRED",
      Self::AuthFailed => "AUTH_FAILED",
      Self::Storage => "STORAGE",
    }
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Failure reported by a [`RemoteGateway`](crate::gateway::RemoteGateway).
///
/// Covers non-2xx responses as well as network failures and timeouts, in
/// which case there is no status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct TransportError {
  pub status: Option<u16>,
  pub message: String,
}

impl TransportError {
  pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
    Self {
      status,
      message: message.into(),
    }
  }

  fn describe(&self) -> String {
    match self.status {
      Some(status) => format!("request failed with status {}: {}", status, self.message),
      None => format!("request failed: {}", self.message),
    }
  }
}

/// Errors surfaced by the client core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
  /// Rejected locally, before any network call.
  #[error("{message}")]
  Validation { code: ErrorCode, message: String },

  #[error(transparent)]
  Transport(#[from] TransportError),

  /// The transport succeeded but the payload is missing required fields.
  #[error("unexpected response shape: {0}")]
  Shape(String),

  /// A write was attempted without an authenticated session.
  #[error("sign in is required for this operation")]
  AuthRequired,

  /// The authorization-code exchange did not produce a token.
  #[error("authentication failed: {0}")]
  AuthFailed(String),

  /// The session-scoped token store could not be read or written.
  #[error("session storage failed: {0}")]
  Storage(String),
}

impl ClientError {
  pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
    Self::Validation {
      code,
      message: message.into(),
    }
  }

  pub fn missing_query() -> Self {
    Self::validation(ErrorCode::MissingQuery, "a search query is required")
  }

  pub fn missing_target(what: &str) -> Self {
    Self::validation(ErrorCode::MissingTarget, format!("{} is required", what))
  }

  pub fn code(&self) -> ErrorCode {
    match self {
      Self::Validation { code, .. } => *code,
      Self::Transport(_) => ErrorCode::Transport,
      Self::Shape(_) => ErrorCode::Shape,
      Self::AuthRequired => ErrorCode::AuthRequired,
      Self::AuthFailed(_) => ErrorCode::AuthFailed,
      Self::Storage(_) => ErrorCode::Storage,
    }
  }

  /// Status code of the upstream response, when there was one.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Transport(e) => e.status,
      _ => None,
    }
  }
}

/// Normalized error as exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
  pub message: String,
  pub code: ErrorCode,
}

impl From<&ClientError> for ErrorInfo {
  fn from(err: &ClientError) -> Self {
    Self {
      message: err.to_string(),
      code: err.code(),
    }
  }
}
