//! Bounded, URI-keyed cache of config responses honoring `Cache-Control` and `ETag`.
use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use lru::LruCache;

use super::HttpResponse;

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub body: Arc<[u8]>,
    pub etag: Option<String>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CacheControl {
    no_store: bool,
    no_cache: bool,
    max_age: Option<Duration>,
}

impl CacheControl {
    fn parse(header: Option<&str>) -> CacheControl {
        let mut result = CacheControl::default();
        for directive in header.unwrap_or_default().split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            match directive.split_once('=') {
                Some(("max-age", seconds)) => {
                    result.max_age = seconds.trim().parse().ok().map(Duration::from_secs);
                }
                _ if directive == "no-store" => result.no_store = true,
                _ if directive == "no-cache" => result.no_cache = true,
                _ => {}
            }
        }
        result
    }
}

pub(crate) struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    pub(crate) fn new(capacity: usize) -> ResponseCache {
        ResponseCache {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub(crate) fn get(&self, uri: &str) -> Option<CacheEntry> {
        self.lock().get(uri).cloned()
    }

    /// Store a successful response. `no-cache` entries are stored already expired so they are
    /// always revalidated; `no-store` responses and responses without `max-age` or `ETag` are not
    /// stored.
    pub(crate) fn store(&self, uri: &str, response: &HttpResponse, now: Instant) -> Option<CacheEntry> {
        let control = CacheControl::parse(response.header("cache-control"));
        let etag = response.header("etag").map(str::to_owned);
        if control.no_store || (control.max_age.is_none() && etag.is_none()) {
            return None;
        }

        let entry = CacheEntry {
            body: Arc::from(response.body.as_slice()),
            etag,
            expires_at: expiry(&control, now),
        };
        self.lock().put(uri.to_owned(), entry.clone());
        Some(entry)
    }

    /// Extend a cached entry after a `304 Not Modified`, using the freshness information of the
    /// revalidation response when it has any.
    pub(crate) fn revalidated(&self, uri: &str, response: &HttpResponse, now: Instant) {
        let control = CacheControl::parse(response.header("cache-control"));
        if control == CacheControl::default() {
            return;
        }
        if let Some(entry) = self.lock().get_mut(uri) {
            entry.expires_at = expiry(&control, now);
            if let Some(etag) = response.header("etag") {
                entry.etag = Some(etag.to_owned());
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries
            .lock()
            .expect("thread holding cache lock should not panic")
    }
}

fn expiry(control: &CacheControl, now: Instant) -> Instant {
    if control.no_cache {
        now
    } else {
        now + control.max_age.unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        time::{Duration, Instant},
    };

    use super::{CacheControl, ResponseCache};
    use crate::transport::HttpResponse;

    fn response(headers: &[(&str, &str)], body: &[u8]) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn parse_cache_control() {
        assert_eq!(
            CacheControl::parse(Some("public, max-age=60")),
            CacheControl {
                max_age: Some(Duration::from_secs(60)),
                ..Default::default()
            }
        );
        assert!(CacheControl::parse(Some("No-Cache")).no_cache);
        assert!(CacheControl::parse(Some("no-store")).no_store);
        assert_eq!(CacheControl::parse(None), CacheControl::default());
    }

    #[test]
    fn max_age_is_fresh() {
        let cache = ResponseCache::new(4);
        let now = Instant::now();

        let entry = cache
            .store("u", &response(&[("Cache-Control", "max-age=60"), ("ETag", "abc")], b"x"), now)
            .unwrap();

        assert!(entry.is_fresh(now));
        assert!(!entry.is_fresh(now + Duration::from_secs(61)));
        assert_eq!(cache.get("u").unwrap().etag.as_deref(), Some("abc"));
    }

    #[test]
    fn no_cache_is_stored_expired() {
        let cache = ResponseCache::new(4);
        let now = Instant::now();

        let entry = cache
            .store("u", &response(&[("Cache-Control", "no-cache"), ("ETag", "e")], b"x"), now)
            .unwrap();

        assert!(!entry.is_fresh(now));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn uncacheable_responses() {
        let cache = ResponseCache::new(4);
        let now = Instant::now();

        assert!(cache
            .store("a", &response(&[("Cache-Control", "no-store"), ("ETag", "e")], b"x"), now)
            .is_none());
        assert!(cache.store("b", &response(&[], b"x"), now).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn revalidation_extends_expiry() {
        let cache = ResponseCache::new(4);
        let now = Instant::now();
        cache.store("u", &response(&[("Cache-Control", "no-cache"), ("ETag", "e")], b"x"), now);

        cache.revalidated("u", &response(&[("Cache-Control", "max-age=30")], b""), now);

        let entry = cache.get("u").unwrap();
        assert!(entry.is_fresh(now));
        assert_eq!(&*entry.body, b"x");
    }

    #[test]
    fn bounded_and_clearable() {
        let cache = ResponseCache::new(2);
        let now = Instant::now();
        for uri in ["a", "b", "c"] {
            cache.store(uri, &response(&[("ETag", "e")], b"x"), now);
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
