//! Agent-card cache — TTL-bounded mapping of base URL to agent card.
//!
//! Cards are fetched on demand from the well-known endpoint
//! (`<base>/.well-known/agent-card.json`) and cached for the configured
//! TTL. Expired entries are evicted lazily: `list_cached` drops them as a
//! side effect, `get_cached` just refuses to return them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::types::AgentCard;

/// Well-known path for agent card discovery.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// Default per-fetch timeout.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`CardCache::fetch_card`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// HTTP timeout for the card request.
    pub timeout: Duration,
    /// Bypass the cache and refetch even if a live entry exists.
    pub force_refresh: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            force_refresh: false,
        }
    }
}

struct CacheEntry {
    card: AgentCard,
    fetched_at: Instant,
}

/// Concurrent-safe agent-card cache keyed by normalized base URL.
pub struct CardCache {
    client: reqwest::Client,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CardCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a cache reusing an existing `reqwest::Client`.
    pub fn with_client(ttl: Duration, client: reqwest::Client) -> Self {
        Self {
            client,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Normalize a base URL for use as a cache key (no trailing slash).
    pub fn normalize_url(url: &str) -> String {
        url.trim_end_matches('/').to_string()
    }

    /// Fetch the card for `url`, returning the cached copy when it is
    /// still live and `force_refresh` is off.
    ///
    /// A non-2xx response fails with
    /// [`SwarmlinkError::CardFetchFailed`]; unknown JSON fields in the
    /// card are tolerated.
    pub async fn fetch_card(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> SwarmlinkResult<AgentCard> {
        let key = Self::normalize_url(url);

        if !options.force_refresh {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!(url = %key, "card cache hit");
                    return Ok(entry.card.clone());
                }
            }
        }

        let card_url = format!("{key}{AGENT_CARD_PATH}");
        debug!(url = %card_url, "fetching agent card");

        let response = self
            .client
            .get(&card_url)
            .header("Accept", "application/json")
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SwarmlinkError::Timeout(format!("card fetch timed out: {e}"))
                } else {
                    SwarmlinkError::Transport(format!("card fetch failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SwarmlinkError::CardFetchFailed {
                status: status.as_u16(),
                url: card_url,
            });
        }

        let card: AgentCard = response
            .json()
            .await
            .map_err(|e| SwarmlinkError::parse_error(format!("invalid agent card: {e}")))?;

        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                card: card.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(card)
    }

    /// Read-only lookup: the cached card for `url` iff it is still live.
    /// Never performs I/O.
    pub async fn get_cached(&self, url: &str) -> Option<AgentCard> {
        let key = Self::normalize_url(url);
        let entries = self.entries.read().await;
        entries
            .get(&key)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.card.clone())
    }

    /// All live cached cards. Expired entries are evicted as a side
    /// effect.
    pub async fn list_cached(&self) -> Vec<AgentCard> {
        let mut entries = self.entries.write().await;
        entries.retain(|url, e| {
            let live = e.fetched_at.elapsed() < self.ttl;
            if !live {
                debug!(url = %url, "evicting expired card");
            }
            live
        });
        entries.values().map(|e| e.card.clone()).collect()
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
