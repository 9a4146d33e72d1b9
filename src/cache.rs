use moka::future::Cache;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Kind of one logical provider request.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum RequestKind {
    Config,
    TvSearch,
    MovieSearch,
    GetImage,
    GetMovie,
    GetTvShow,
    SeasonInfo,
    TvInfo,
}

static ID_IN_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:movie|tv)/(\d+)").expect("Invalid id path regex")
});

/// Identity of one logical request: kind, normalized path+query (scheme and
/// host stripped), and the provider id extracted from the URL. Two handles
/// are equal iff this tuple matches.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RequestKey {
    pub kind: RequestKind,
    pub path_query: String,
    pub id: String,
}

impl RequestKey {
    pub fn new(kind: RequestKind, path_query: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            path_query: path_query.into(),
            id: id.into(),
        }
    }

    /// Build a key from a full URL, stripping scheme and host.
    pub fn from_url(kind: RequestKind, url: &str) -> Self {
        let path_query = match url.find("://") {
            Some(scheme_end) => {
                let rest = &url[scheme_end + 3..];
                match rest.find('/') {
                    Some(path_start) => &rest[path_start..],
                    None => "",
                }
            }
            None => url,
        };

        let id = ID_IN_PATH
            .captures(path_query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Self {
            kind,
            path_query: path_query.to_string(),
            id,
        }
    }
}

/// Byte store for previously fetched responses, keyed by request identity.
///
/// Identical keys always return the same cached bytes instead of re-issuing
/// the call; all I/O stays with the orchestrator.
#[derive(Clone)]
pub struct RequestCache {
    entries: Cache<RequestKey, Arc<Vec<u8>>>,
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl RequestCache {
    pub fn new() -> Self {
        Self::with_capacity(2048, Duration::from_secs(3600))
    }

    pub fn with_capacity(max_entries: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &RequestKey) -> Option<Arc<Vec<u8>>> {
        self.entries.get(key).await
    }

    pub async fn insert(&self, key: RequestKey, bytes: Vec<u8>) {
        self.entries.insert(key, Arc::new(bytes)).await;
    }

    pub async fn remove(&self, key: &RequestKey) {
        self.entries.invalidate(key).await;
    }

    /// Remove a session's own completed lookups, used on cancellation so a
    /// retry does not replay partial state.
    pub async fn remove_all(&self, keys: &[RequestKey]) {
        for key in keys {
            self.entries.invalidate(key).await;
        }
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_url_strips_scheme_and_host() {
        let a = RequestKey::from_url(
            RequestKind::GetMovie,
            "https://api.themoviedb.org/3/movie/438631?api_key=k",
        );
        let b = RequestKey::new(RequestKind::GetMovie, "/3/movie/438631?api_key=k", "438631");
        assert_eq!(a, b);
        assert_eq!(a.id, "438631");
    }

    #[test]
    fn test_key_extracts_tv_id() {
        let key = RequestKey::from_url(
            RequestKind::SeasonInfo,
            "https://api.themoviedb.org/3/tv/1396/season/2?api_key=k",
        );
        assert_eq!(key.id, "1396");
    }

    #[test]
    fn test_keys_differ_by_kind() {
        let a = RequestKey::new(RequestKind::TvSearch, "/3/search/tv?query=show", "");
        let b = RequestKey::new(RequestKind::MovieSearch, "/3/search/tv?query=show", "");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = RequestCache::new();
        let key = RequestKey::new(RequestKind::Config, "/3/configuration", "");

        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), b"payload".to_vec()).await;
        let hit = cache.get(&key).await.expect("cached bytes");
        assert_eq!(hit.as_slice(), b"payload");

        // The identical key keeps returning the identical bytes.
        let again = cache.get(&key).await.expect("cached bytes");
        assert_eq!(again.as_slice(), hit.as_slice());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let cache = RequestCache::new();
        let a = RequestKey::new(RequestKind::MovieSearch, "/3/search/movie?query=dune", "");
        let b = RequestKey::new(RequestKind::GetMovie, "/3/movie/438631", "438631");

        cache.insert(a.clone(), b"a".to_vec()).await;
        cache.insert(b.clone(), b"b".to_vec()).await;

        cache.remove_all(&[a.clone()]).await;
        assert!(cache.get(&a).await.is_none());
        assert!(cache.get(&b).await.is_some());
    }
}
