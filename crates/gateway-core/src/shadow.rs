//! TTL-bounded map from shadow id to the original tool output (spec.md §4.1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generates a `shadow_`-prefixed, URL-safe id with at least 96 bits of
/// entropy (16 alphabet characters at ~5.95 bits each clears the bar).
pub fn new_shadow_id() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..18)
        .map(|_| {
            let idx = rng.gen_range(0..ID_ALPHABET.len());
            ID_ALPHABET[idx] as char
        })
        .collect();
    format!("shadow_{}", body)
}

#[derive(Debug, Clone)]
pub struct ShadowEntry {
    pub original_content: String,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl ShadowEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// In-memory, TTL-swept shadow store. Reads acquire a read-lock, writes an
/// exclusive lock; expiry is checked lazily on `get` in addition to the
/// background sweep so expiry is observed even if the sweeper is behind.
#[derive(Clone)]
pub struct ShadowStore {
    inner: Arc<RwLock<HashMap<String, ShadowEntry>>>,
    default_ttl: Duration,
}

impl ShadowStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Idempotent insert: a second `put` with the same id is a no-op, even
    /// if the content differs.
    pub async fn put(
        &self,
        id: &str,
        content: &str,
        tool_name: Option<String>,
        tool_call_id: Option<String>,
    ) {
        let mut map = self.inner.write().await;
        map.entry(id.to_string()).or_insert_with(|| ShadowEntry {
            original_content: content.to_string(),
            tool_name,
            tool_call_id,
            created_at: Instant::now(),
            ttl: self.default_ttl,
        });
    }

    /// Returns `None` if absent or expired. Never returns partially expired
    /// data: an entry past its TTL is treated identically to an absent one
    /// and is opportunistically removed.
    pub async fn get(&self, id: &str) -> Option<String> {
        let now = Instant::now();
        {
            let map = self.inner.read().await;
            match map.get(id) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.original_content.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry is present but expired: drop it under a write lock.
        let mut map = self.inner.write().await;
        map.remove(id);
        None
    }

    /// Looks up an existing shadow id whose content matches `content`
    /// byte-for-byte, enabling inter-request cache hits (spec.md §4.4
    /// "Deduplication / caching"). O(n) in the number of live entries;
    /// acceptable given the store is bounded by TTL and expected request
    /// volume for a single gateway process.
    pub async fn find_by_content(&self, content: &str) -> Option<String> {
        let now = Instant::now();
        let map = self.inner.read().await;
        map.iter()
            .find(|(_, entry)| !entry.is_expired(now) && entry.original_content == content)
            .map(|(id, _)| id.clone())
    }

    /// Removes all expired entries. Intended to run on an internal timer;
    /// safe to call concurrently with `get`/`put`.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Spawns the background sweeper on the given interval. Returns a
    /// `JoinHandle` the caller may abort on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "shadow store sweep");
                }
            }
        })
    }
}
