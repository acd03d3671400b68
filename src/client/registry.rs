//! Agent registry — the set of known remote agents plus discovery.
//!
//! Known agents persist for process lifetime; discovery fans card fetches
//! out in parallel across the registry, folds in any other live cached
//! cards, and filters by free-text query and skill tags.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{AgentCard, KnownAgent};

use super::card_cache::{CardCache, FetchOptions};

/// Default maximum number of discovery results.
const DEFAULT_DISCOVER_LIMIT: usize = 10;

/// Options for [`AgentRegistry::discover`].
#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Case-insensitive substring matched against card name, description,
    /// and skill names/descriptions/tags.
    pub query: Option<String>,
    /// Require at least one of these tags on some skill.
    pub tags: Option<Vec<String>>,
    /// Maximum number of cards returned (default 10).
    pub limit: Option<usize>,
}

/// Set of known remote agents, deduplicated by URL, with discovery over
/// the shared [`CardCache`].
pub struct AgentRegistry {
    cache: Arc<CardCache>,
    known: RwLock<Vec<KnownAgent>>,
}

impl AgentRegistry {
    /// Create a registry over the given card cache.
    pub fn new(cache: Arc<CardCache>) -> Self {
        Self {
            cache,
            known: RwLock::new(Vec::new()),
        }
    }

    /// Register a remote agent. Idempotent: re-registering the same URL
    /// replaces the entry in place without changing its position.
    pub async fn register(&self, agent: KnownAgent) {
        let url = CardCache::normalize_url(&agent.url);
        let agent = KnownAgent { url: url.clone(), ..agent };

        let mut known = self.known.write().await;
        if let Some(existing) = known.iter_mut().find(|a| a.url == url) {
            *existing = agent;
        } else {
            debug!(url = %url, "agent registered");
            known.push(agent);
        }
    }

    /// Remove an agent by URL. Unknown URLs are a no-op.
    pub async fn unregister(&self, url: &str) {
        let url = CardCache::normalize_url(url);
        self.known.write().await.retain(|a| a.url != url);
    }

    /// Snapshot of the known agents in registration order.
    pub async fn known_agents(&self) -> Vec<KnownAgent> {
        self.known.read().await.clone()
    }

    /// Discover agents matching the options.
    ///
    /// Fetches cards for every known URL in parallel (failures ignored),
    /// folds in live cached cards for URLs outside the registry, filters,
    /// and returns at most `limit` cards in stable insertion order.
    pub async fn discover(&self, options: DiscoverOptions) -> Vec<AgentCard> {
        let urls: Vec<String> = {
            let known = self.known.read().await;
            known.iter().map(|a| a.url.clone()).collect()
        };

        let fetches = urls.iter().map(|url| {
            let cache = Arc::clone(&self.cache);
            let url = url.clone();
            async move { cache.fetch_card(&url, FetchOptions::default()).await.ok() }
        });

        let mut cards: Vec<AgentCard> = join_all(fetches).await.into_iter().flatten().collect();

        // Fold in cached cards that are not already present.
        for cached in self.cache.list_cached().await {
            if !cards.iter().any(|c| c.url == cached.url) {
                cards.push(cached);
            }
        }

        let query = options.query.as_deref().map(str::to_lowercase);
        let tags = options.tags.unwrap_or_default();
        let limit = options.limit.unwrap_or(DEFAULT_DISCOVER_LIMIT);

        cards
            .into_iter()
            .filter(|card| {
                if let Some(query) = &query {
                    if !card_matches_query(card, query) {
                        return false;
                    }
                }
                if !tags.is_empty() && !card_has_any_tag(card, &tags) {
                    return false;
                }
                true
            })
            .take(limit)
            .collect()
    }
}

fn card_matches_query(card: &AgentCard, query: &str) -> bool {
    if card.name.to_lowercase().contains(query)
        || card.description.to_lowercase().contains(query)
    {
        return true;
    }
    card.skills.iter().any(|skill| {
        skill.name.to_lowercase().contains(query)
            || skill.description.to_lowercase().contains(query)
            || skill.tags.iter().any(|t| t.to_lowercase().contains(query))
    })
}

fn card_has_any_tag(card: &AgentCard, tags: &[String]) -> bool {
    card.skills.iter().any(|skill| {
        skill
            .tags
            .iter()
            .any(|t| tags.iter().any(|wanted| t.eq_ignore_ascii_case(wanted)))
    })
}
