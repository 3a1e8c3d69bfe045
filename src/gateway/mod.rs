//! Remote gateway abstraction.
//!
//! The core never talks to the network directly. Every facade issues a
//! [`GatewayRequest`] through an injected [`RemoteGateway`] and gets back
//! parsed JSON or a [`TransportError`].

mod http;

pub use http::HttpGateway;
pub use reqwest::Method;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// An HTTP-style request, relative to whatever base the gateway resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
  pub method: Method,
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  pub headers: Vec<(String, String)>,
}

impl GatewayRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
      headers: Vec::new(),
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(Method::POST, path)
  }

  pub fn query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_string(), value.to_string()));
    self
  }

  pub fn json(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.push((name.to_string(), value.into()));
    self
  }

  /// Attach an `Authorization: Bearer` header.
  pub fn bearer(self, token: &str) -> Self {
    self.header("Authorization", format!("Bearer {}", token))
  }

  /// Look up a query parameter by name.
  pub fn query_param(&self, key: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Look up a header by name (case-insensitive).
  pub fn header_value(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Capability to issue a request and return its JSON payload.
///
/// Timeouts are the implementation's business; they surface as an ordinary
/// [`TransportError`].
#[async_trait]
pub trait RemoteGateway: Send + Sync {
  async fn request(&self, request: GatewayRequest) -> Result<Value, TransportError>;
}
