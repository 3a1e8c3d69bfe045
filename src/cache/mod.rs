//! In-memory response cache.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores one typed [`ResultSet`] per derived query key (last write wins)
//! - Serves cache-first lookups and only stores successful fetches
//! - Purges entries by predicate over their keys (e.g. every comment page of a video)
//!
//! There is no eviction; the store lives as long as the client instance.

mod store;
mod traits;

pub use store::CacheStore;
pub use traits::{Cacheable, QueryKey, ResultSet};
