use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::{GatewayRequest, RemoteGateway};
use crate::config::ApiConfig;
use crate::error::TransportError;

/// [`RemoteGateway`] over `reqwest`, resolving request paths against a base URL.
///
/// Request paths are taken relative to the base URL, so a base such as
/// `https://host/mia` keeps its `/mia` prefix.
#[derive(Clone, Debug)]
pub struct HttpGateway {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpGateway {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("Invalid API base URL {}", config.base_url));
    }
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      // SSRF no thank you.
      .redirect(reqwest::redirect::Policy::none())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  fn resolve(&self, path: &str) -> Result<Url, TransportError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| TransportError::new(None, format!("invalid request path {}: {}", path, e)))
  }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
  #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
  async fn request(&self, request: GatewayRequest) -> Result<Value, TransportError> {
    let url = self.resolve(&request.path)?;

    let mut builder = self.client.request(request.method.clone(), url);
    if !request.query.is_empty() {
      builder = builder.query(&request.query);
    }
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      let message = if e.is_timeout() {
        "request timed out".to_string()
      } else {
        e.to_string()
      };
      tracing::warn!(error = %message, "gateway request failed");
      TransportError::new(e.status().map(|s| s.as_u16()), message)
    })?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| TransportError::new(Some(status.as_u16()), e.to_string()))?;

    if !status.is_success() {
      tracing::warn!(status = status.as_u16(), "gateway returned an error status");
      let message = if text.is_empty() {
        status
          .canonical_reason()
          .unwrap_or("unknown error")
          .to_string()
      } else {
        text
      };
      return Err(TransportError::new(Some(status.as_u16()), message));
    }

    if text.trim().is_empty() {
      return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| {
      TransportError::new(
        Some(status.as_u16()),
        format!("response is not valid JSON: {}", e),
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn gateway_for(server: &MockServer) -> HttpGateway {
    HttpGateway::new(&ApiConfig {
      base_url: server.uri(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  #[tokio::test]
  async fn test_get_with_query_returns_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/youtube"))
      .and(query_param("type", "playlist"))
      .and(query_param("id", "PL123"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
      .mount(&server)
      .await;

    let gateway = gateway_for(&server);
    let value = gateway
      .request(
        GatewayRequest::get("/api/youtube")
          .query("type", "playlist")
          .query("id", "PL123"),
      )
      .await
      .unwrap();

    assert_eq!(value, json!({ "items": [] }));
  }

  #[tokio::test]
  async fn test_post_sends_bearer_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/youtube/rate"))
      .and(header("authorization", "Bearer tok"))
      .and(body_json(json!({ "videoId": "v1", "rating": "like" })))
      .respond_with(ResponseTemplate::new(204))
      .mount(&server)
      .await;

    let gateway = gateway_for(&server);
    let value = gateway
      .request(
        GatewayRequest::post("/api/youtube/rate")
          .bearer("tok")
          .json(json!({ "videoId": "v1", "rating": "like" })),
      )
      .await
      .unwrap();

    assert_eq!(value, Value::Null);
  }

  #[tokio::test]
  async fn test_error_status_becomes_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/naver/news/search"))
      .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
      .mount(&server)
      .await;

    let gateway = gateway_for(&server);
    let err = gateway
      .request(GatewayRequest::get("/api/naver/news/search"))
      .await
      .unwrap_err();

    assert_eq!(err.status, Some(500));
    assert_eq!(err.message, "boom");
  }

  #[tokio::test]
  async fn test_invalid_json_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/firebase/search/k"))
      .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
      .mount(&server)
      .await;

    let gateway = gateway_for(&server);
    let err = gateway
      .request(GatewayRequest::get("/api/firebase/search/k"))
      .await
      .unwrap_err();

    assert_eq!(err.status, Some(200));
    assert!(err.message.contains("not valid JSON"));
  }

  #[tokio::test]
  async fn test_base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/mia/api/youtube"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
      .mount(&server)
      .await;

    let gateway = HttpGateway::new(&ApiConfig {
      base_url: format!("{}/mia", server.uri()),
      timeout_secs: 5,
    })
    .unwrap();
    let value = gateway
      .request(GatewayRequest::get("/api/youtube"))
      .await
      .unwrap();

    assert_eq!(value, json!({ "items": [] }));
  }

  #[tokio::test]
  async fn test_timeout_becomes_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/naver/blog/search"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({ "items": [] }))
          .set_delay(Duration::from_secs(3)),
      )
      .mount(&server)
      .await;

    let gateway = HttpGateway::new(&ApiConfig {
      base_url: server.uri(),
      timeout_secs: 1,
    })
    .unwrap();
    let err = gateway
      .request(GatewayRequest::get("/api/naver/blog/search"))
      .await
      .unwrap_err();

    assert_eq!(err.status, None);
    assert_eq!(err.message, "request timed out");
  }

  #[test]
  fn test_rejects_invalid_base_url() {
    let result = HttpGateway::new(&ApiConfig {
      base_url: "not a url".to_string(),
      timeout_secs: 5,
    });
    assert!(result.is_err());
  }
}
