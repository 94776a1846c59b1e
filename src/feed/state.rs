use std::collections::HashSet;
use thiserror::Error;

use crate::news::{Article, Filter};
use crate::transport::TransportError;

/// Error recorded on the feed session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A background fetch panicked; the message is the panic payload.
    #[error("Background task panicked: {0}")]
    TaskPanicked(String),
}

/// Coarse state of a feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Everything the presentation layer renders for one feed session.
///
/// Owned and mutated only by the feed controller; readers get `&FeedState`.
#[derive(Debug, Clone)]
pub struct FeedState {
    /// Loaded articles in first-seen order, unique by id.
    pub articles: Vec<Article>,
    /// Token for the next page; `None` once the stream is exhausted.
    pub cursor: Option<String>,
    pub has_more: bool,
    pub is_loading: bool,
    /// Most recent fetch error. Cleared by the next successful page.
    pub last_error: Option<FeedError>,
    pub selected_filters: HashSet<Filter>,
    pub search_query: String,
    /// Set once any page has been applied in this session.
    pub loaded: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            articles: Vec::new(),
            cursor: None,
            has_more: true,
            is_loading: false,
            last_error: None,
            selected_filters: HashSet::new(),
            search_query: String::new(),
            loaded: false,
        }
    }
}

impl FeedState {
    pub fn status(&self) -> FeedStatus {
        if self.is_loading {
            FeedStatus::Loading
        } else if self.last_error.is_some() {
            FeedStatus::Errored
        } else if self.loaded {
            FeedStatus::Loaded
        } else {
            FeedStatus::Idle
        }
    }

    /// Zero articles and nothing in flight: the UI shows its empty view.
    pub fn shows_empty_state(&self) -> bool {
        self.articles.is_empty() && !self.is_loading
    }

    pub fn article(&self, id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.articles.iter().position(|a| a.id == id)
    }

    /// Drop pagination state and loaded articles. Filters and query survive.
    pub(crate) fn reset_pages(&mut self) {
        self.articles.clear();
        self.cursor = None;
        self.has_more = true;
        self.loaded = false;
    }

    /// Append articles that are neither already loaded nor from a blocked source.
    ///
    /// Pages may overlap, and a page may repeat an id internally; the first
    /// occurrence wins. Returns the number of articles appended.
    pub(crate) fn append_unique(
        &mut self,
        items: Vec<Article>,
        blocked_sources: &HashSet<String>,
    ) -> usize {
        let mut seen: HashSet<String> = self.articles.iter().map(|a| a.id.clone()).collect();
        let before = self.articles.len();

        for article in items {
            if blocked_sources.contains(&article.source.id) {
                continue;
            }
            if seen.insert(article.id.clone()) {
                self.articles.push(article);
            }
        }

        self.articles.len() - before
    }

    /// Remove articles from blocked sources in place. Returns how many were removed.
    pub(crate) fn retain_unblocked(&mut self, blocked_sources: &HashSet<String>) -> usize {
        let before = self.articles.len();
        self.articles
            .retain(|a| !blocked_sources.contains(&a.source.id));
        before - self.articles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::Source;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn article(id: &str, source: &str) -> Article {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Title {id}"),
            "content": "Body",
            "source": {"id": source, "name": source},
            "language": "en",
            "published_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn test_status_transitions() {
        let mut state = FeedState::default();
        assert_eq!(state.status(), FeedStatus::Idle);
        assert!(state.shows_empty_state());

        state.is_loading = true;
        assert_eq!(state.status(), FeedStatus::Loading);
        assert!(!state.shows_empty_state());

        state.is_loading = false;
        state.loaded = true;
        assert_eq!(state.status(), FeedStatus::Loaded);

        state.last_error = Some(FeedError::Transport(TransportError::Auth));
        assert_eq!(state.status(), FeedStatus::Errored);
    }

    #[test]
    fn test_append_skips_blocked_and_duplicates() {
        let mut state = FeedState::default();
        let blocked: HashSet<String> = ["tabloid".to_string()].into_iter().collect();

        let added = state.append_unique(
            vec![article("a", "wire"), article("b", "tabloid"), article("a", "wire")],
            &blocked,
        );
        assert_eq!(added, 1);

        let added = state.append_unique(vec![article("a", "wire"), article("c", "wire")], &blocked);
        assert_eq!(added, 1);

        let ids: Vec<&str> = state.articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_retain_unblocked() {
        let mut state = FeedState::default();
        state.append_unique(
            vec![article("a", "wire"), article("b", "tabloid"), article("c", "tabloid")],
            &HashSet::new(),
        );
        let blocked: HashSet<String> = ["tabloid".to_string()].into_iter().collect();
        assert_eq!(state.retain_unblocked(&blocked), 2);
        assert_eq!(state.articles.len(), 1);
        assert_eq!(state.index_of("a"), Some(0));
        assert!(state.article("b").is_none());
    }

    #[test]
    fn test_reset_keeps_filters_and_query() {
        let mut state = FeedState {
            search_query: "derby".to_string(),
            cursor: Some("c1".to_string()),
            has_more: false,
            loaded: true,
            ..FeedState::default()
        };
        state.append_unique(vec![article("a", "wire")], &HashSet::new());
        state.reset_pages();

        assert!(state.articles.is_empty());
        assert!(state.cursor.is_none());
        assert!(state.has_more);
        assert!(!state.loaded);
        assert_eq!(state.search_query, "derby");
    }

    #[test]
    fn test_shared_source_reference() {
        let source = Arc::new(Source {
            id: "wire".to_string(),
            name: "Wire".to_string(),
            icon_url: None,
            reliability_score: 7,
        });
        let mut a = article("a", "wire");
        let mut b = article("b", "wire");
        a.source = Arc::clone(&source);
        b.source = Arc::clone(&source);
        assert!(Arc::ptr_eq(&a.source, &b.source));
    }

    proptest! {
        /// Overlapping pages yield each id exactly once, in first-seen order.
        #[test]
        fn prop_pages_deduplicate_in_first_seen_order(
            pages in prop::collection::vec(prop::collection::vec(0u8..30, 0..12), 1..6)
        ) {
            let mut state = FeedState::default();
            let mut expected: Vec<String> = Vec::new();

            for page in &pages {
                let items: Vec<Article> = page
                    .iter()
                    .map(|n| article(&format!("id-{n}"), "wire"))
                    .collect();
                for n in page {
                    let id = format!("id-{n}");
                    if !expected.contains(&id) {
                        expected.push(id);
                    }
                }
                state.append_unique(items, &HashSet::new());
            }

            let ids: Vec<String> = state.articles.iter().map(|a| a.id.clone()).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
