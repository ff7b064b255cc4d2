//! Composite cache key for chunk entries.
//!
//! A key names one (project, version, active-flag) triple, so a project can
//! hold several live entries at once: the current active payload plus
//! entries for earlier versions that have not yet expired.

use std::fmt;

use yoconf_core::{Chunk, Version};

/// Delimiter between key components.
const DELIMITER: char = ':';

const ACTIVE: &str = "active";
const INACTIVE: &str = "inactive";

/// Cache key for a single chunk entry.
///
/// # Token Format
///
/// `"{project}:{version}:{active|inactive}"`
///
/// The version and flag are parsed from the right, so project names that
/// themselves contain the delimiter still decode to the original key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    project: String,
    version: Version,
    active: bool,
}

impl CacheKey {
    pub fn new(project: impl Into<String>, version: Version, active: bool) -> Self {
        Self {
            inner: CacheKeyInner {
                project: project.into(),
                version,
                active,
            },
        }
    }

    /// Key under which a chunk is cached.
    pub fn for_chunk(chunk: &Chunk) -> Self {
        Self::new(chunk.project.clone(), chunk.version, chunk.active)
    }

    pub fn project(&self) -> &str {
        &self.inner.project
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn is_active(&self) -> bool {
        self.inner.active
    }

    pub fn encode(&self) -> String {
        let flag = if self.inner.active { ACTIVE } else { INACTIVE };
        format!(
            "{}{DELIMITER}{}{DELIMITER}{flag}",
            self.inner.project, self.inner.version
        )
    }

    /// Decode a token produced by [`CacheKey::encode`].
    ///
    /// Returns `None` for a missing component, an empty project, a
    /// non-numeric version or an unknown flag.
    pub fn decode(token: &str) -> Option<Self> {
        let mut parts = token.rsplitn(3, DELIMITER);
        let active = match parts.next()? {
            ACTIVE => true,
            INACTIVE => false,
            _ => return None,
        };
        let version = parts.next()?.parse().ok()?;
        let project = parts.next()?;
        if project.is_empty() {
            return None;
        }
        Some(Self::new(project, version, active))
    }

    /// Prefix shared by every token of a project.
    ///
    /// Projects that extend this project's name past the delimiter share the
    /// prefix too; callers must compare the decoded project.
    pub fn project_prefix(project: &str) -> String {
        format!("{project}{DELIMITER}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_format() {
        assert_eq!(CacheKey::new("billing", 2, true).encode(), "billing:2:active");
        assert_eq!(
            CacheKey::new("billing", 1, false).encode(),
            "billing:1:inactive"
        );
    }

    #[test]
    fn test_decode_project_containing_delimiter() {
        let key = CacheKey::new("team:billing", 3, true);
        assert_eq!(CacheKey::decode(&key.encode()), Some(key));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        for token in [
            "",
            "billing",
            "billing:1",
            ":1:active",
            "billing:x:active",
            "billing:1:maybe",
            "billing:-1:active",
        ] {
            assert_eq!(CacheKey::decode(token), None, "{token}");
        }
    }

    #[test]
    fn test_for_chunk_uses_chunk_flag() {
        let chunk = Chunk::new("p", 4, "x", false);
        let key = CacheKey::for_chunk(&chunk);
        assert_eq!(key.project(), "p");
        assert_eq!(key.version(), 4);
        assert!(!key.is_active());
    }

    #[test]
    fn test_distinct_flags_are_distinct_keys() {
        assert_ne!(CacheKey::new("p", 1, true), CacheKey::new("p", 1, false));
        assert_ne!(
            CacheKey::new("p", 1, true).encode(),
            CacheKey::new("p", 1, false).encode()
        );
    }

    #[test]
    fn test_project_prefix() {
        let key = CacheKey::new("billing", 9, true);
        assert!(key.encode().starts_with(&CacheKey::project_prefix("billing")));
    }
}
