//! Session management: OAuth authorization and the session-scoped token store.

mod manager;
mod storage;

pub use manager::{
  AuthManager, AuthPhase, BrowserNavigator, Navigator, Session, ACCESS_TOKEN_KEY, OAUTH_STATE_KEY,
};
pub use storage::{MemorySessionStorage, SessionStorage, SqliteSessionStorage};
