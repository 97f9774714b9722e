//! Per-requestor conversation histories with inactivity expiry.

use std::sync::Arc;

use chrono::Duration;

use parley_core::cache::{Clock, TtlCache};
use parley_core::types::ConversationHistory;

/// Expiring requestor → history store.
///
/// Histories are handed out by value. The router owns its copy for the
/// length of a turn and writes it back with [`SessionStore::store`], so two
/// concurrent turns for the same requestor may lose one turn's messages but
/// never corrupt each other.
#[derive(Debug)]
pub struct SessionStore {
    cache: TtlCache<String, ConversationHistory>,
}

impl SessionStore {
    pub const DEFAULT_TTL_HOURS: i64 = 12;

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

    /// The live history for `requestor`, or a fresh one. Either way the
    /// entry's expiry is pushed out by a full TTL.
    pub fn checkout(&self, requestor: &str) -> ConversationHistory {
        let history = self.cache.get(&requestor.to_string()).unwrap_or_default();
        self.cache.insert(requestor.to_string(), history.clone());
        history
    }

    pub fn store(&self, requestor: &str, history: ConversationHistory) {
        self.cache.insert(requestor.to_string(), history);
    }

    /// Replace the requestor's history with an empty one.
    pub fn reset(&self, requestor: &str) {
        self.store(requestor, ConversationHistory::new());
    }

    pub fn get(&self, requestor: &str) -> Option<ConversationHistory> {
        self.cache.get(&requestor.to_string())
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(Self::DEFAULT_TTL_HOURS))
    }
}
