use async_trait::async_trait;
use std::collections::BTreeSet;

use super::types::{Article, League, Page};
use crate::cache::{FeedCache, FeedCacheKey, FEED_CACHE_CAPACITY};
use crate::config::Config;
use crate::transport::{TransportClient, TransportError};

/// Default page size when the caller has no preference.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Everything needed to request one page of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    /// `None` means all leagues.
    pub league_ids: Option<BTreeSet<String>>,
    /// `None` requests the first page.
    pub cursor: Option<String>,
    pub limit: usize,
    /// Free-text search; `None` for the plain feed.
    pub search: Option<String>,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            league_ids: None,
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
            search: None,
        }
    }
}

/// Page provider consumed by the feed controller.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page, TransportError>;

    /// Forget any cached first page for `league_ids` (`None`: all of them).
    fn invalidate(&self, _league_ids: Option<&BTreeSet<String>>) {}
}

/// Typed access to the news API with first-page caching.
///
/// Adds no retry logic of its own; errors from the transport are returned
/// unchanged.
pub struct NewsRepository {
    client: TransportClient,
    feed_cache: FeedCache,
}

impl NewsRepository {
    pub fn new(client: TransportClient, feed_cache: FeedCache) -> Self {
        Self { client, feed_cache }
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let client = TransportClient::new(config)?;
        let capacity = if config.feed_cache_capacity == 0 {
            FEED_CACHE_CAPACITY
        } else {
            config.feed_cache_capacity
        };
        Ok(Self::new(
            client,
            FeedCache::new(capacity, config.feed_cache_ttl()),
        ))
    }

    pub fn feed_cache(&self) -> &FeedCache {
        &self.feed_cache
    }

    /// Fetch one page of the feed.
    ///
    /// Only first pages (no cursor) for an explicit league set are cached. A
    /// cache hit is returned with `next_cursor = None`; any request carrying a
    /// cursor neither reads nor writes the cache.
    pub async fn fetch_feed(
        &self,
        league_ids: Option<&BTreeSet<String>>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, TransportError> {
        let league_ids = league_ids.filter(|ids| !ids.is_empty());
        let cache_key = match (league_ids, cursor) {
            (Some(ids), None) => Some(FeedCacheKey::from_league_ids(ids)),
            _ => None,
        };

        if let Some(key) = &cache_key {
            if let Some(mut page) = self.feed_cache.get(key) {
                tracing::debug!(key = key.as_str(), items = page.items.len(), "Feed cache hit");
                page.next_cursor = None;
                return Ok(page);
            }
        }

        let params = page_params(league_ids, cursor, limit, None);
        let page: Page = self.client.get("news", &params).await?;

        if let Some(key) = cache_key {
            tracing::debug!(key = key.as_str(), items = page.items.len(), "Caching first page");
            self.feed_cache.put(key, page.clone());
        }

        Ok(page)
    }

    /// Full-text search over the feed. Never cached.
    pub async fn search(
        &self,
        query: &str,
        league_ids: Option<&BTreeSet<String>>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, TransportError> {
        let league_ids = league_ids.filter(|ids| !ids.is_empty());
        let params = page_params(league_ids, cursor, limit, Some(query));
        self.client.get("news", &params).await
    }

    pub async fn fetch_detail(&self, id: &str) -> Result<Article, TransportError> {
        if id.is_empty() || id.contains(['/', '?', '#']) {
            return Err(TransportError::InvalidRequest(format!(
                "invalid article id: {id:?}"
            )));
        }
        self.client.get(&format!("news/{id}"), &[]).await
    }

    pub async fn fetch_leagues(&self) -> Result<Vec<League>, TransportError> {
        self.client.get("leagues", &[]).await
    }

    /// Drop the cached first page for a league set, or every page for `None`.
    pub fn invalidate_feed_cache(&self, league_ids: Option<&BTreeSet<String>>) {
        match league_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                self.feed_cache
                    .invalidate(&FeedCacheKey::from_league_ids(ids));
            }
            None => self.feed_cache.clear(),
        }
    }
}

#[async_trait]
impl NewsSource for NewsRepository {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page, TransportError> {
        match query.search.as_deref().filter(|q| !q.is_empty()) {
            Some(text) => {
                self.search(
                    text,
                    query.league_ids.as_ref(),
                    query.cursor.as_deref(),
                    query.limit,
                )
                .await
            }
            None => {
                self.fetch_feed(
                    query.league_ids.as_ref(),
                    query.cursor.as_deref(),
                    query.limit,
                )
                .await
            }
        }
    }

    fn invalidate(&self, league_ids: Option<&BTreeSet<String>>) {
        self.invalidate_feed_cache(league_ids);
    }
}

fn page_params(
    league_ids: Option<&BTreeSet<String>>,
    cursor: Option<&str>,
    limit: usize,
    search: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(4);
    if let Some(ids) = league_ids {
        // BTreeSet iteration is sorted, matching the cache key order
        let joined = ids.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        params.push(("leagues", joined));
    }
    if let Some(cursor) = cursor {
        params.push(("after", cursor.to_string()));
    }
    params.push(("limit", limit.max(1).to_string()));
    if let Some(text) = search {
        params.push(("q", text.to_string()));
    }
    params
}
