//! Remembered popup dimensions keyed by URL.
//!
//! A size is stored under the exact URL with query and fragment stripped,
//! and under the URL's origin. Lookups try the exact key first and fall
//! back to the origin.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use popout_windows::Window;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::storage::KeyValueStorage;

pub const SIZE_KEY_PREFIX: &str = "popup/size/";

static URL_WITHOUT_SEARCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^?#]+").expect("valid url pattern"));

static ORIGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^:/?#]+:(/{2,3})?[^/?#]+").expect("valid origin pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    /// Dimensions of a host window, when the host reported both.
    pub fn of(window: &Window) -> Option<Self> {
        Some(Self {
            width: window.width?,
            height: window.height?,
        })
    }
}

/// `https://example.com/page?x=1#top` becomes `https://example.com/page`.
pub fn url_without_search(url: &str) -> &str {
    URL_WITHOUT_SEARCH
        .find(url)
        .map(|m| m.as_str())
        .unwrap_or(url)
}

/// Scheme, host and port of `url`, or `None` for schemeless or malformed
/// input.
pub fn origin_of(url: &str) -> Option<&str> {
    ORIGIN.find(url).map(|m| m.as_str())
}

pub fn storage_key(key: &str) -> String {
    format!("{}{}", SIZE_KEY_PREFIX, key)
}

/// Storage keys for `url` in lookup order: exact path, then origin. Empty
/// when the url has no origin; such urls are never remembered.
pub fn lookup_keys(url: &str) -> Vec<String> {
    let Some(origin) = origin_of(url) else {
        return Vec::new();
    };
    let mut keys = vec![storage_key(url_without_search(url))];
    let origin_key = storage_key(origin);
    if !keys.contains(&origin_key) {
        keys.push(origin_key);
    }
    keys
}

/// Size memory over a key-value storage backend.
pub struct SizeMemory<S> {
    storage: Arc<S>,
}

impl<S> Clone for SizeMemory<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<S: KeyValueStorage> SizeMemory<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// First remembered size for `url`, exact key before origin key.
    pub async fn lookup(&self, url: &str) -> StorageResult<Option<WindowSize>> {
        let keys = lookup_keys(url);
        if keys.is_empty() {
            return Ok(None);
        }
        let found = self.storage.get(&keys).await?;
        for key in &keys {
            let Some(value) = found.get(key) else {
                continue;
            };
            match serde_json::from_value::<WindowSize>(value.clone()) {
                Ok(size) => return Ok(Some(size)),
                Err(err) => log::warn!("ignoring malformed size entry {}: {}", key, err),
            }
        }
        Ok(None)
    }

    /// Record `size` under the exact and origin keys of `url`. Returns
    /// `false` without writing when `url` has no origin.
    pub async fn remember_url(&self, url: &str, size: WindowSize) -> StorageResult<bool> {
        let keys = lookup_keys(url);
        if keys.is_empty() {
            return Ok(false);
        }
        self.write(keys, size).await?;
        Ok(true)
    }

    /// Record `size` under the origin key only.
    pub async fn remember_origin(&self, origin: &str, size: WindowSize) -> StorageResult<()> {
        self.write(vec![storage_key(origin)], size).await
    }

    async fn write(&self, keys: Vec<String>, size: WindowSize) -> StorageResult<()> {
        let value = serde_json::to_value(size)?;
        let entries: HashMap<String, serde_json::Value> =
            keys.into_iter().map(|key| (key, value.clone())).collect();
        self.storage.set(entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_url_without_search_strips_query_and_fragment() {
        assert_eq!(
            url_without_search("https://example.com/page?x=1"),
            "https://example.com/page"
        );
        assert_eq!(
            url_without_search("https://example.com/page#top"),
            "https://example.com/page"
        );
        assert_eq!(url_without_search("https://example.com/"), "https://example.com/");
        assert_eq!(url_without_search("?only"), "?only");
    }

    #[test]
    fn test_origin_of_common_urls() {
        assert_eq!(origin_of("https://example.com/page"), Some("https://example.com"));
        assert_eq!(
            origin_of("http://localhost:8080/a/b?c"),
            Some("http://localhost:8080")
        );
        assert_eq!(origin_of("https://example.com?x=1"), Some("https://example.com"));
        assert_eq!(origin_of("file:///home/user/doc.html"), Some("file:///home"));
        assert_eq!(origin_of("about:blank"), Some("about:blank"));
    }

    #[test]
    fn test_origin_of_unresolvable_urls() {
        assert_eq!(origin_of("example.com/page"), None);
        assert_eq!(origin_of(""), None);
        assert_eq!(origin_of("https://"), None);
    }

    #[test]
    fn test_lookup_keys_order_and_dedup() {
        assert_eq!(
            lookup_keys("https://example.com/page?x=1"),
            vec![
                "popup/size/https://example.com/page".to_string(),
                "popup/size/https://example.com".to_string(),
            ]
        );
        assert_eq!(
            lookup_keys("https://example.com"),
            vec!["popup/size/https://example.com".to_string()]
        );
        assert!(lookup_keys("no-scheme").is_empty());
        assert!(lookup_keys("").is_empty());
    }

    #[tokio::test]
    async fn test_url_without_origin_is_not_remembered() {
        let storage = Arc::new(MemoryStorage::new());
        let memory = SizeMemory::new(storage.clone());
        let size = WindowSize {
            width: 640,
            height: 480,
        };

        assert!(!memory.remember_url("no-scheme-here", size).await.unwrap());
        assert!(storage.is_empty());

        storage
            .set(HashMap::from([(
                "popup/size/no-scheme-here".to_string(),
                serde_json::to_value(size).unwrap(),
            )]))
            .await
            .unwrap();
        assert_eq!(memory.lookup("no-scheme-here").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_prefers_exact_over_origin() {
        let memory = SizeMemory::new(Arc::new(MemoryStorage::new()));
        memory
            .remember_origin("https://example.com", WindowSize { width: 1, height: 1 })
            .await
            .unwrap();
        memory
            .remember_url(
                "https://example.com/page?x=1",
                WindowSize {
                    width: 800,
                    height: 600,
                },
            )
            .await
            .unwrap();
        memory
            .remember_origin("https://example.com", WindowSize { width: 2, height: 2 })
            .await
            .unwrap();

        let exact = memory.lookup("https://example.com/page?x=2").await.unwrap();
        assert_eq!(
            exact,
            Some(WindowSize {
                width: 800,
                height: 600
            })
        );
        let origin = memory.lookup("https://example.com/other").await.unwrap();
        assert_eq!(origin, Some(WindowSize { width: 2, height: 2 }));
        assert_eq!(memory.lookup("https://other.test/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_entry_falls_through_to_origin() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(HashMap::from([(
                "popup/size/https://example.com/page".to_string(),
                serde_json::json!("not a size"),
            )]))
            .await
            .unwrap();
        let memory = SizeMemory::new(storage);
        memory
            .remember_origin(
                "https://example.com",
                WindowSize {
                    width: 300,
                    height: 200,
                },
            )
            .await
            .unwrap();

        let size = memory.lookup("https://example.com/page").await.unwrap();
        assert_eq!(
            size,
            Some(WindowSize {
                width: 300,
                height: 200
            })
        );
    }
}
