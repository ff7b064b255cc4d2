//! Ephemeral chunk cache.
//!
//! Entries are keyed by [`CacheKey`] (project, version, active flag) and carry
//! a fixed TTL. The cache accelerates reads only; the config store stays the
//! source of truth, and callers decide per operation whether a cache failure
//! is fatal.

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheEntry, CacheStats};
