//! Memoized column metadata for relational subjects.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use parley_core::cache::{Clock, TtlCache};

/// Cache key for the column description of `schema.table` under `subject`.
pub fn cache_key(subject: &str, schema: &str, table: &str) -> String {
    format!("{}_{}_{}_describe_columns", subject, schema, table)
}

/// Expiring (subject, schema, table) → column description cache.
///
/// A value lives for one TTL from when it was computed; hits do not extend it.
#[derive(Debug)]
pub struct FieldMetadataCache {
    cache: TtlCache<String, String>,
}

impl FieldMetadataCache {
    pub const DEFAULT_TTL_HOURS: i64 = 24;

    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::with_clock(ttl, clock),
        }
    }

    /// Return the cached description, or run `compute` and cache its result.
    ///
    /// Errors from `compute` are returned and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        subject: &str,
        schema: &str,
        table: &str,
        compute: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let key = cache_key(subject, schema, table);
        if let Some(fields) = self.cache.get(&key) {
            debug!(key = %key, "Field metadata cache hit");
            return Ok(fields);
        }

        debug!(key = %key, "Field metadata cache miss");
        let fields = compute().await?;
        self.cache.insert(key, fields.clone());
        Ok(fields)
    }

    pub fn get(&self, subject: &str, schema: &str, table: &str) -> Option<String> {
        self.cache.get(&cache_key(subject, schema, table))
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for FieldMetadataCache {
    fn default() -> Self {
        Self::new(Duration::hours(Self::DEFAULT_TTL_HOURS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parley_core::cache::ManualClock;

    fn cache() -> (FieldMetadataCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = FieldMetadataCache::with_clock(Duration::hours(24), clock.clone());
        (cache, clock)
    }

    async fn lookup(cache: &FieldMetadataCache, calls: &AtomicUsize) -> Result<String, String> {
        cache
            .get_or_compute("Invoices", "dbo", "invoices", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("dbo.invoices, id\n".to_string())
            })
            .await
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(
            cache_key("Invoices", "dbo", "invoices"),
            "Invoices_dbo_invoices_describe_columns"
        );
    }

    #[tokio::test]
    async fn test_memoizes_within_ttl() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        assert_eq!(lookup(&cache, &calls).await.unwrap(), "dbo.invoices, id\n");
        clock.advance(Duration::hours(23));
        assert_eq!(lookup(&cache, &calls).await.unwrap(), "dbo.invoices, id\n");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recomputes_after_ttl() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        lookup(&cache, &calls).await.unwrap();
        clock.advance(Duration::hours(12));
        lookup(&cache, &calls).await.unwrap();
        // Hits do not extend the lifetime.
        clock.advance(Duration::hours(12));
        lookup(&cache, &calls).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (cache, _) = cache();
        let result: Result<String, String> = cache
            .get_or_compute("Invoices", "dbo", "invoices", || async {
                Err("connection refused".to_string())
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_distinct_per_table() {
        let (cache, _) = cache();
        cache
            .get_or_compute("A", "dbo", "t1", || async { Ok::<_, String>("one".to_string()) })
            .await
            .unwrap();
        cache
            .get_or_compute("A", "dbo", "t2", || async { Ok::<_, String>("two".to_string()) })
            .await
            .unwrap();
        assert_eq!(cache.get("A", "dbo", "t1").as_deref(), Some("one"));
        assert_eq!(cache.get("A", "dbo", "t2").as_deref(), Some("two"));
        assert_eq!(cache.len(), 2);
    }
}
