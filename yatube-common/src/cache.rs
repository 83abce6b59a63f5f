//! Whole-page response cache.
//!
//! Entries live for a fixed window measured on an injected [`Clock`]. Writes to the underlying
//! data never invalidate anything; only [`PageCache::clear`] or expiry does.

use crate::clock::Clock;
use moka::sync::Cache;
use std::{future::Future, sync::Arc};
use time::{Duration, UtcDateTime};
use tracing::debug;

pub const DEFAULT_PAGE_CACHE_TTL: Duration = Duration::seconds(20);

/// Distinct keys held at once. Least valuable entries are evicted past this.
pub const DEFAULT_PAGE_CACHE_CAPACITY: u64 = 1000;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
struct CachedPage {
    body: String,
    expires_at: UtcDateTime,
}

#[derive(Debug)]
pub struct PageCache {
    prefix: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Cache<String, CachedPage>,
}

impl PageCache {
    #[must_use]
    pub fn new(prefix: impl Into<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(prefix, ttl, DEFAULT_PAGE_CACHE_CAPACITY, clock)
    }

    /// Expiry follows `clock`; the wall-clock time to live only reclaims memory of entries
    /// nobody asks for again.
    #[must_use]
    pub fn with_capacity(
        prefix: impl Into<String>,
        ttl: Duration,
        capacity: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl.unsigned_abs())
            .build();

        Self {
            prefix: prefix.into(),
            ttl,
            clock,
            entries,
        }
    }

    /// `scope` separates renderings that differ per viewer; `path_and_query` separates routes
    /// and pages.
    #[must_use]
    pub fn key(&self, scope: &str, path_and_query: &str) -> String {
        format!("{}:{scope}:{path_and_query}", self.prefix)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let page = self.entries.get(key)?;

        if page.expires_at > self.clock.now() {
            Some(page.body)
        } else {
            self.entries.invalidate(key);
            None
        }
    }

    pub fn insert(&self, key: String, body: String) {
        let page = CachedPage {
            body,
            expires_at: self.clock.now() + self.ttl,
        };
        self.entries.insert(key, page);
    }

    /// Returns the cached body for `key`, rendering and storing it on a miss.
    ///
    /// Failed renders are not cached.
    pub async fn get_or_render<F, Fut, E>(&self, key: String, render: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(body) = self.get(&key) {
            debug!(key = %key, "page cache hit");
            return Ok(body);
        }

        debug!(key = %key, "page cache miss, rendering");
        let body = render().await?;
        self.insert(key, body.clone());

        Ok(body)
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    #[cfg(test)]
    fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}
