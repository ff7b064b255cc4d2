//! yoconf Storage - Store and Cache Contracts
//!
//! Defines the two collaborators the orchestrator sequences: the durable
//! [`ConfigStore`] and the ephemeral [`CacheBackend`], with in-memory and
//! LMDB implementations. The PostgreSQL store lives in yoconf-api.

pub mod cache;
pub mod store;

pub use cache::{
    CacheBackend, CacheEntry, CacheKey, CacheStats, InMemoryCacheBackend, LmdbCacheBackend,
    LmdbCacheError,
};
pub use store::{Activation, ConfigStore, InMemoryConfigStore};
