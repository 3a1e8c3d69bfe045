//! Composition root: one cache, one session and one history per client.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::{Config, StorageKind};
use crate::documents::DocumentFacade;
use crate::gateway::{HttpGateway, RemoteGateway};
use crate::pagination::PaginationEngine;
use crate::search::{SearchFacade, SearchHistory};
use crate::session::{AuthManager, MemorySessionStorage, SessionStorage, SqliteSessionStorage};
use crate::youtube::{CommentFacade, VideoFacade};

/// Owns the shared state and hands a handle of it to every facade.
#[derive(Clone)]
pub struct Client {
  cache: CacheStore,
  auth: AuthManager,
  history: SearchHistory,
  videos: VideoFacade,
  comments: CommentFacade,
  search: SearchFacade,
  documents: DocumentFacade,
}

impl Client {
  pub fn new(
    config: &Config,
    gateway: Arc<dyn RemoteGateway>,
    storage: Arc<dyn SessionStorage>,
  ) -> Self {
    let cache = CacheStore::new();
    let history = SearchHistory::new();
    let threads = PaginationEngine::new();
    let auth = AuthManager::new(config.oauth.clone(), gateway.clone(), storage);

    Self {
      videos: VideoFacade::new(gateway.clone(), cache.clone(), auth.clone(), threads.clone()),
      comments: CommentFacade::new(gateway.clone(), cache.clone(), auth.clone(), threads),
      search: SearchFacade::new(gateway.clone(), cache.clone(), history.clone()),
      documents: DocumentFacade::new(gateway, cache.clone()),
      cache,
      auth,
      history,
    }
  }

  /// Build a client over HTTP with the configured session storage, and pick
  /// up a token stored earlier in this login session.
  pub fn from_config(config: &Config) -> Result<Self> {
    let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(&config.api)?);
    let storage: Arc<dyn SessionStorage> = match config.session.storage {
      StorageKind::Sqlite => Arc::new(SqliteSessionStorage::open(
        &config.api.base_url,
        config.client_id(),
      )?),
      StorageKind::Memory => Arc::new(MemorySessionStorage::new()),
    };

    let client = Self::new(config, gateway, storage);
    if let Err(e) = client.auth.restore_session() {
      tracing::warn!(error = %e, "could not restore session");
    }
    Ok(client)
  }

  pub fn videos(&self) -> &VideoFacade {
    &self.videos
  }

  pub fn comments(&self) -> &CommentFacade {
    &self.comments
  }

  pub fn search(&self) -> &SearchFacade {
    &self.search
  }

  pub fn documents(&self) -> &DocumentFacade {
    &self.documents
  }

  pub fn auth(&self) -> &AuthManager {
    &self.auth
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn history(&self) -> &SearchHistory {
    &self.history
  }
}
