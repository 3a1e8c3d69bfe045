//! OAuth authorization-code flow and access-token lifecycle.
//!
//! ```text
//!            initiate_oauth            complete_oauth (ok)
//! ANONYMOUS ───────────────► PENDING ───────────────────► AUTHENTICATED
//!     ▲                        │  ▲                            │
//!     │                        └──┘ complete_oauth (error)     │
//!     │              restore_session (token stored)            │
//!     ├────────────────────────────────────────────────────────┤
//!     └──────────────────────────── logout ◄───────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{AccessToken, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::instrument;
use url::Url;

use super::storage::SessionStorage;
use crate::config::OAuthConfig;
use crate::error::{ClientError, ErrorCode};
use crate::gateway::{GatewayRequest, RemoteGateway};

/// Session storage key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "mia.access_token";

/// Session storage key holding the anti-forgery state of a pending authorization.
pub const OAUTH_STATE_KEY: &str = "mia.oauth_state";

/// Upper bound for `expires_in`, a year.
const MAX_TOKEN_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

/// Hands the user over to the authorization page.
pub trait Navigator: Send + Sync {
  fn navigate(&self, url: &Url) -> Result<(), ClientError>;
}

/// Opens the authorization page in the user's browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
  fn navigate(&self, url: &Url) -> Result<(), ClientError> {
    tracing::info!(url = %url, "asking user to follow OAuth flow");
    webbrowser::open(url.as_str())
      .map_err(|e| ClientError::AuthFailed(format!("could not open the browser: {}", e)))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
  Anonymous,
  Pending,
  Authenticated,
}

/// What callers may know about the current session.
#[derive(Debug, Clone, Default)]
pub struct Session {
  pub access_token: Option<AccessToken>,
  pub is_authenticated: bool,
}

#[derive(Debug)]
enum AuthState {
  Anonymous,
  Pending,
  Authenticated {
    token: AccessToken,
    /// Only known for tokens obtained in this process
    expires_at: Option<DateTime<Utc>>,
  },
}

impl AuthState {
  fn phase(&self) -> AuthPhase {
    match self {
      Self::Anonymous => AuthPhase::Anonymous,
      Self::Pending => AuthPhase::Pending,
      Self::Authenticated { .. } => AuthPhase::Authenticated,
    }
  }

  fn live_token(&self) -> Option<&AccessToken> {
    match self {
      Self::Authenticated { token, expires_at } => match expires_at {
        Some(at) if Utc::now() >= *at => None,
        _ => Some(token),
      },
      _ => None,
    }
  }
}

/// Response of the code-for-token exchange.
#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
  access_token: Option<String>,
  expires_in: Option<u64>,
  token_type: Option<String>,
}

/// Owns the one session of a client instance.
///
/// Cloning yields another handle onto the same session.
#[derive(Clone)]
pub struct AuthManager {
  oauth: Arc<OAuthConfig>,
  gateway: Arc<dyn RemoteGateway>,
  storage: Arc<dyn SessionStorage>,
  state: Arc<Mutex<AuthState>>,
}

impl AuthManager {
  pub fn new(
    oauth: OAuthConfig,
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn SessionStorage>,
  ) -> Self {
    Self {
      oauth: Arc::new(oauth),
      gateway,
      storage,
      state: Arc::new(Mutex::new(AuthState::Anonymous)),
    }
  }

  fn state(&self) -> MutexGuard<'_, AuthState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn phase(&self) -> AuthPhase {
    self.state().phase()
  }

  pub fn is_authenticated(&self) -> bool {
    self.state().live_token().is_some()
  }

  pub fn session(&self) -> Session {
    let state = self.state();
    let token = state.live_token().cloned();
    Session {
      is_authenticated: token.is_some(),
      access_token: token,
    }
  }

  /// The token to attach to an authenticated write.
  pub fn bearer_token(&self) -> Result<AccessToken, ClientError> {
    let state = self.state();
    match state.live_token() {
      Some(token) => Ok(token.clone()),
      None => {
        if matches!(*state, AuthState::Authenticated { .. }) {
          tracing::info!("access token expired, sign in again");
        }
        Err(ClientError::AuthRequired)
      }
    }
  }

  /// Fall back to anonymous once the token has expired, forgetting the stored copy.
  fn drop_expired(&self) {
    let mut state = self.state();
    if !matches!(*state, AuthState::Authenticated { .. }) || state.live_token().is_some() {
      return;
    }
    *state = AuthState::Anonymous;
    drop(state);
    if let Err(e) = self.storage.remove_item(ACCESS_TOKEN_KEY) {
      tracing::warn!(error = %e, "could not remove expired access token");
    }
    tracing::info!("access token expired, session is anonymous again");
  }

  fn client_id(&self) -> Result<&str, ClientError> {
    self.oauth.client_id().ok_or_else(|| {
      ClientError::validation(
        ErrorCode::OauthNotConfigured,
        "OAuth client id is not configured",
      )
    })
  }

  /// Build the authorization URL and hand it to `navigator`.
  ///
  /// Fails without any transition when no client id is configured, when the
  /// session is already authenticated, or when navigation fails.
  #[instrument(skip(self, navigator))]
  pub fn initiate_oauth(&self, navigator: &dyn Navigator) -> Result<Url, ClientError> {
    let client_id = self.client_id()?;
    self.drop_expired();
    if self.is_authenticated() {
      return Err(ClientError::validation(
        ErrorCode::AlreadyAuthenticated,
        "already signed in; log out first",
      ));
    }

    let auth_url = AuthUrl::new(self.oauth.auth_url.clone()).map_err(|e| {
      ClientError::validation(
        ErrorCode::OauthNotConfigured,
        format!("invalid authorization URL: {}", e),
      )
    })?;
    let redirect_url = RedirectUrl::new(self.oauth.redirect_uri.clone()).map_err(|e| {
      ClientError::validation(
        ErrorCode::OauthNotConfigured,
        format!("invalid redirect URI: {}", e),
      )
    })?;

    let client = BasicClient::new(ClientId::new(client_id.to_string()))
      .set_auth_uri(auth_url)
      .set_redirect_uri(redirect_url);
    let (url, csrf) = client
      .authorize_url(CsrfToken::new_random)
      .add_scopes(self.oauth.scopes.iter().cloned().map(Scope::new))
      .add_extra_param("access_type", "offline")
      .add_extra_param("prompt", "consent")
      .url();

    self.storage.set_item(OAUTH_STATE_KEY, csrf.secret())?;
    if let Err(e) = navigator.navigate(&url) {
      if let Err(cleanup) = self.storage.remove_item(OAUTH_STATE_KEY) {
        tracing::warn!(error = %cleanup, "could not clear pending authorization state");
      }
      return Err(e);
    }

    *self.state() = AuthState::Pending;
    tracing::info!("authorization started");
    Ok(url)
  }

  /// Exchange an authorization code for an access token.
  ///
  /// On failure the session is left pending (an authenticated session keeps
  /// its current token) and [`ClientError::AuthFailed`] is returned. No
  /// placeholder token is ever installed.
  #[instrument(skip(self, code))]
  pub async fn complete_oauth(&self, code: &str) -> Result<Session, ClientError> {
    let code = code.trim();
    if code.is_empty() {
      return Err(ClientError::validation(
        ErrorCode::MissingCode,
        "an authorization code is required",
      ));
    }
    let client_id = self.client_id()?.to_string();

    {
      let mut state = self.state();
      if !matches!(*state, AuthState::Authenticated { .. }) {
        // The callback may land in a fresh instance that never saw initiate_oauth.
        *state = AuthState::Pending;
      }
    }

    let request = GatewayRequest::post(self.oauth.token_path.as_str()).json(json!({
      "code": code,
      "redirectUri": self.oauth.redirect_uri,
      "clientId": client_id,
    }));
    let response = self.gateway.request(request).await.map_err(|e| {
      tracing::warn!(error = %e, "authorization code exchange failed");
      ClientError::AuthFailed(format!("exchange authorization code: {}", e))
    })?;

    let exchange: TokenExchangeResponse = serde_json::from_value(response)
      .map_err(|e| ClientError::AuthFailed(format!("unexpected token response: {}", e)))?;
    if let Some(token_type) = &exchange.token_type {
      if !token_type.eq_ignore_ascii_case("bearer") {
        return Err(ClientError::AuthFailed(format!(
          "unsupported token type {}",
          token_type
        )));
      }
    }
    let token = exchange
      .access_token
      .filter(|t| !t.trim().is_empty())
      .ok_or_else(|| ClientError::AuthFailed("token response has no access_token".to_string()))?;

    self.storage.set_item(ACCESS_TOKEN_KEY, &token)?;
    if let Err(e) = self.storage.remove_item(OAUTH_STATE_KEY) {
      tracing::warn!(error = %e, "could not clear pending authorization state");
    }

    let expires_at = exchange
      .expires_in
      .map(|secs| Utc::now() + Duration::seconds(secs.min(MAX_TOKEN_LIFETIME_SECS) as i64));
    *self.state() = AuthState::Authenticated {
      token: AccessToken::new(token),
      expires_at,
    };
    tracing::info!(expires_at = ?expires_at, "signed in");
    Ok(self.session())
  }

  /// Complete the flow from the URL the authorization server redirected to.
  ///
  /// The `state` parameter must match the one stored by [`Self::initiate_oauth`].
  pub async fn complete_oauth_callback(&self, callback: &Url) -> Result<Session, ClientError> {
    let mut code = None;
    let mut returned_state = None;
    let mut error = None;
    for (k, v) in callback.query_pairs() {
      match &*k {
        "code" => code = Some(v.into_owned()),
        "state" => returned_state = Some(v.into_owned()),
        "error" => error = Some(v.into_owned()),
        _ => {}
      }
    }

    if let Some(error) = error {
      return Err(ClientError::AuthFailed(format!(
        "authorization was denied: {}",
        error
      )));
    }

    let expected = self.storage.get_item(OAUTH_STATE_KEY)?;
    match (expected, returned_state) {
      (Some(expected), Some(returned)) if expected == returned => {}
      (None, _) => {
        return Err(ClientError::AuthFailed(
          "no authorization is in progress".to_string(),
        ))
      }
      _ => {
        return Err(ClientError::AuthFailed(
          "authorization state does not match".to_string(),
        ))
      }
    }

    let code = code.ok_or_else(|| {
      ClientError::validation(ErrorCode::MissingCode, "callback carries no authorization code")
    })?;
    self.complete_oauth(&code).await
  }

  /// Pick up a token stored earlier in this login session.
  ///
  /// Returns whether the session is authenticated afterwards. Does nothing
  /// when no token is stored.
  pub fn restore_session(&self) -> Result<bool, ClientError> {
    self.drop_expired();
    if self.is_authenticated() {
      return Ok(true);
    }

    match self.storage.get_item(ACCESS_TOKEN_KEY)? {
      Some(token) if !token.trim().is_empty() => {
        *self.state() = AuthState::Authenticated {
          token: AccessToken::new(token),
          expires_at: None,
        };
        tracing::info!("restored session");
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  /// Forget the token, in memory and in session storage.
  ///
  /// The session stays as it was when storage cannot be cleared.
  pub fn logout(&self) -> Result<(), ClientError> {
    self.storage.remove_item(ACCESS_TOKEN_KEY)?;
    self.storage.remove_item(OAUTH_STATE_KEY)?;
    *self.state() = AuthState::Anonymous;
    tracing::info!("signed out");
    Ok(())
  }
}

impl std::fmt::Debug for AuthManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AuthManager")
      .field("phase", &self.phase())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TransportError;
  use crate::session::MemorySessionStorage;
  use crate::testing::{RecordingNavigator, ScriptedGateway};

  fn oauth_config() -> OAuthConfig {
    OAuthConfig {
      client_id: Some("client-123".to_string()),
      ..OAuthConfig::default()
    }
  }

  fn token_gateway() -> Arc<ScriptedGateway> {
    ScriptedGateway::new(|request| {
      let code = request.body.as_ref().and_then(|b| b["code"].as_str());
      match code {
        Some("good") => Ok(json!({
          "access_token": "ya29.token",
          "expires_in": 3599,
          "token_type": "Bearer",
        })),
        _ => Err(TransportError::new(Some(400), "invalid_grant")),
      }
    })
  }

  fn manager_with(
    oauth: OAuthConfig,
    gateway: Arc<ScriptedGateway>,
  ) -> (AuthManager, Arc<MemorySessionStorage>) {
    let storage = Arc::new(MemorySessionStorage::new());
    (AuthManager::new(oauth, gateway, storage.clone()), storage)
  }

  #[test]
  fn test_initiate_builds_authorization_url() {
    let (manager, storage) = manager_with(oauth_config(), ScriptedGateway::offline());
    let navigator = RecordingNavigator::default();

    let url = manager.initiate_oauth(&navigator).unwrap();

    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "client-123");
    assert_eq!(params["redirect_uri"], "http://localhost:3000/oauth/callback");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["access_type"], "offline");
    assert_eq!(params["prompt"], "consent");
    assert!(params["scope"].contains("youtube"));
    assert_eq!(
      storage.get_item(OAUTH_STATE_KEY).unwrap().as_deref(),
      Some(params["state"].as_str())
    );
    assert_eq!(manager.phase(), AuthPhase::Pending);
    assert_eq!(navigator.visited.lock().unwrap().len(), 1);
  }

  #[test]
  fn test_initiate_without_client_id_fails_fast() {
    let (manager, _) = manager_with(OAuthConfig::default(), ScriptedGateway::offline());
    let navigator = RecordingNavigator::default();

    let err = manager.initiate_oauth(&navigator).unwrap_err();

    assert_eq!(err.code(), ErrorCode::OauthNotConfigured);
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    assert!(navigator.visited.lock().unwrap().is_empty());
  }

  struct FailingNavigator;

  impl Navigator for FailingNavigator {
    fn navigate(&self, _url: &Url) -> Result<(), ClientError> {
      Err(ClientError::AuthFailed("no browser".to_string()))
    }
  }

  #[test]
  fn test_failed_navigation_clears_state() {
    let (manager, storage) = manager_with(oauth_config(), ScriptedGateway::offline());

    let err = manager.initiate_oauth(&FailingNavigator).unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(_)));
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    assert_eq!(storage.get_item(OAUTH_STATE_KEY).unwrap(), None);

    let storage = Arc::new(StickyStorage(MemorySessionStorage::new()));
    let manager = AuthManager::new(oauth_config(), ScriptedGateway::offline(), storage);
    let err = manager.initiate_oauth(&FailingNavigator).unwrap_err();
    assert!(err.to_string().contains("no browser"));
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
  }

  #[tokio::test]
  async fn test_complete_stores_token() {
    let gateway = token_gateway();
    let (manager, storage) = manager_with(oauth_config(), gateway.clone());
    manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap();

    let session = manager.complete_oauth("good").await.unwrap();

    assert!(session.is_authenticated);
    assert_eq!(session.access_token.unwrap().secret(), "ya29.token");
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
    assert_eq!(
      storage.get_item(ACCESS_TOKEN_KEY).unwrap().as_deref(),
      Some("ya29.token")
    );
    assert_eq!(storage.get_item(OAUTH_STATE_KEY).unwrap(), None);

    let request = gateway.last_request().unwrap();
    assert_eq!(request.path, "/api/auth/token");
    assert_eq!(
      request.body.unwrap(),
      json!({
        "code": "good",
        "redirectUri": "http://localhost:3000/oauth/callback",
        "clientId": "client-123",
      })
    );
  }

  #[tokio::test]
  async fn test_failed_exchange_stays_pending_without_token() {
    let (manager, storage) = manager_with(oauth_config(), token_gateway());
    manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap();

    let err = manager.complete_oauth("bad").await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::AuthFailed);
    assert_eq!(manager.phase(), AuthPhase::Pending);
    assert!(!manager.is_authenticated());
    assert_eq!(storage.get_item(ACCESS_TOKEN_KEY).unwrap(), None);
    assert!(matches!(manager.bearer_token(), Err(ClientError::AuthRequired)));
  }

  #[tokio::test]
  async fn test_response_without_token_is_auth_failure() {
    let gateway = ScriptedGateway::new(|_| Ok(json!({ "token_type": "Bearer" })));
    let (manager, _) = manager_with(oauth_config(), gateway);

    let err = manager.complete_oauth("good").await.unwrap_err();

    assert!(matches!(err, ClientError::AuthFailed(_)));
    assert!(!manager.is_authenticated());
  }

  #[tokio::test]
  async fn test_empty_code_makes_no_request() {
    let gateway = token_gateway();
    let (manager, _) = manager_with(oauth_config(), gateway.clone());

    let err = manager.complete_oauth("  ").await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::MissingCode);
    assert_eq!(gateway.calls(), 0);
  }

  #[tokio::test]
  async fn test_callback_checks_state() {
    let gateway = token_gateway();
    let (manager, _) = manager_with(oauth_config(), gateway.clone());
    let url = manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap();
    let state = url
      .query_pairs()
      .find(|(k, _)| k == "state")
      .map(|(_, v)| v.into_owned())
      .unwrap();

    let forged = Url::parse("http://localhost:3000/oauth/callback?code=good&state=forged").unwrap();
    let err = manager.complete_oauth_callback(&forged).await.unwrap_err();
    assert!(matches!(err, ClientError::AuthFailed(_)));
    assert_eq!(gateway.calls(), 0);

    let mut callback = Url::parse("http://localhost:3000/oauth/callback").unwrap();
    callback
      .query_pairs_mut()
      .append_pair("code", "good")
      .append_pair("state", &state);
    let session = manager.complete_oauth_callback(&callback).await.unwrap();
    assert!(session.is_authenticated);
  }

  #[tokio::test]
  async fn test_callback_with_error_is_auth_failure() {
    let (manager, _) = manager_with(oauth_config(), token_gateway());
    let callback =
      Url::parse("http://localhost:3000/oauth/callback?error=access_denied").unwrap();

    let err = manager.complete_oauth_callback(&callback).await.unwrap_err();

    assert!(err.to_string().contains("access_denied"));
  }

  #[test]
  fn test_restore_session_from_storage() {
    let (manager, storage) = manager_with(oauth_config(), ScriptedGateway::offline());
    assert!(!manager.restore_session().unwrap());
    assert_eq!(manager.phase(), AuthPhase::Anonymous);

    storage.set_item(ACCESS_TOKEN_KEY, "restored").unwrap();
    assert!(manager.restore_session().unwrap());
    assert!(manager.restore_session().unwrap());
    assert_eq!(manager.bearer_token().unwrap().secret(), "restored");
  }

  #[tokio::test]
  async fn test_logout_clears_everything() {
    let (manager, storage) = manager_with(oauth_config(), token_gateway());
    manager.complete_oauth("good").await.unwrap();

    manager.logout().unwrap();

    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    assert!(matches!(manager.bearer_token(), Err(ClientError::AuthRequired)));
    assert_eq!(storage.get_item(ACCESS_TOKEN_KEY).unwrap(), None);
    assert!(!manager.restore_session().unwrap());
  }

  #[tokio::test]
  async fn test_initiate_rejected_while_authenticated() {
    let (manager, _) = manager_with(oauth_config(), token_gateway());
    manager.complete_oauth("good").await.unwrap();

    let err = manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap_err();

    assert_eq!(err.code(), ErrorCode::AlreadyAuthenticated);
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
  }

  /// Storage whose deletes always fail.
  struct StickyStorage(MemorySessionStorage);

  impl SessionStorage for StickyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, ClientError> {
      self.0.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), ClientError> {
      self.0.set_item(key, value)
    }

    fn remove_item(&self, _key: &str) -> Result<(), ClientError> {
      Err(ClientError::Storage("database is locked".to_string()))
    }
  }

  #[tokio::test]
  async fn test_failed_logout_keeps_session() {
    let storage = Arc::new(StickyStorage(MemorySessionStorage::new()));
    let manager = AuthManager::new(oauth_config(), token_gateway(), storage.clone());
    manager.complete_oauth("good").await.unwrap();

    let err = manager.logout().unwrap_err();

    assert_eq!(err.code(), ErrorCode::Storage);
    assert!(manager.is_authenticated());
    assert_eq!(
      storage.get_item(ACCESS_TOKEN_KEY).unwrap().as_deref(),
      Some("ya29.token")
    );
  }

  #[tokio::test]
  async fn test_expired_session_can_sign_in_again() {
    let gateway = ScriptedGateway::new(|_| Ok(json!({ "access_token": "short", "expires_in": 0 })));
    let (manager, storage) = manager_with(oauth_config(), gateway);
    manager.complete_oauth("good").await.unwrap();

    assert!(!manager.restore_session().unwrap());
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    assert_eq!(storage.get_item(ACCESS_TOKEN_KEY).unwrap(), None);

    manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap();
    assert_eq!(manager.phase(), AuthPhase::Pending);
  }

  #[tokio::test]
  async fn test_initiate_after_expiry_is_allowed() {
    let gateway = ScriptedGateway::new(|_| Ok(json!({ "access_token": "short", "expires_in": 0 })));
    let (manager, _) = manager_with(oauth_config(), gateway);
    manager.complete_oauth("good").await.unwrap();

    let url = manager
      .initiate_oauth(&RecordingNavigator::default())
      .unwrap();

    assert!(url.query_pairs().any(|(k, _)| k == "state"));
    assert_eq!(manager.phase(), AuthPhase::Pending);
  }

  #[tokio::test]
  async fn test_expired_token_requires_auth() {
    let gateway = ScriptedGateway::new(|_| Ok(json!({ "access_token": "short", "expires_in": 0 })));
    let (manager, _) = manager_with(oauth_config(), gateway);

    manager.complete_oauth("good").await.unwrap();

    assert!(!manager.is_authenticated());
    assert!(matches!(manager.bearer_token(), Err(ClientError::AuthRequired)));
  }
}
