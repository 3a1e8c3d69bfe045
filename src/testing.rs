//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::config::OAuthConfig;
use crate::error::{ClientError, TransportError};
use crate::gateway::{GatewayRequest, RemoteGateway};
use crate::session::{AuthManager, MemorySessionStorage, Navigator, SessionStorage, ACCESS_TOKEN_KEY};

type Handler = Box<dyn Fn(&GatewayRequest) -> Result<Value, TransportError> + Send + Sync>;

/// Gateway that answers through a closure and records every request.
///
/// Each request yields once before answering, so overlapping calls really
/// overlap.
pub(crate) struct ScriptedGateway {
  handler: Handler,
  requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
  pub(crate) fn new(
    handler: impl Fn(&GatewayRequest) -> Result<Value, TransportError> + Send + Sync + 'static,
  ) -> Arc<Self> {
    Arc::new(Self {
      handler: Box::new(handler),
      requests: Mutex::new(Vec::new()),
    })
  }

  /// A gateway that fails every request; for tests that expect no network use.
  pub(crate) fn offline() -> Arc<Self> {
    Self::new(|request| {
      Err(TransportError::new(
        None,
        format!("unexpected request to {}", request.path),
      ))
    })
  }

  pub(crate) fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub(crate) fn requests(&self) -> Vec<GatewayRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub(crate) fn last_request(&self) -> Option<GatewayRequest> {
    self.requests.lock().unwrap().last().cloned()
  }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
  async fn request(&self, request: GatewayRequest) -> Result<Value, TransportError> {
    self.requests.lock().unwrap().push(request.clone());
    tokio::task::yield_now().await;
    (self.handler)(&request)
  }
}

/// Navigator that remembers where it was sent.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
  pub(crate) visited: Mutex<Vec<Url>>,
}

impl Navigator for RecordingNavigator {
  fn navigate(&self, url: &Url) -> Result<(), ClientError> {
    self.visited.lock().unwrap().push(url.clone());
    Ok(())
  }
}

/// An auth manager over `gateway`, signed in with `token` when one is given.
pub(crate) fn auth_manager(gateway: Arc<ScriptedGateway>, token: Option<&str>) -> AuthManager {
  let storage = Arc::new(MemorySessionStorage::new());
  if let Some(token) = token {
    storage.set_item(ACCESS_TOKEN_KEY, token).unwrap();
  }
  let auth = AuthManager::new(OAuthConfig::default(), gateway, storage);
  auth.restore_session().unwrap();
  auth
}
