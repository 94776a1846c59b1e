//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use matchday::{
    Article, Config, FeedQuery, LanguageCode, NewsSource, Page, ProgressReporter,
    TranslationEngine, TransportError,
};

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config pointed at a local mock server, with short delays.
pub fn test_config(base_url: &str) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        rate_limit_delay_ms: 10,
        attempt_timeout_ms: 2_000,
        resource_timeout_ms: 4_000,
        ..Config::default()
    }
}

pub fn article_json(id: &str, source: &str, lang: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Headline {id}"),
        "content": format!("Report {id}"),
        "summary": "",
        "source": {"id": source, "name": source.to_uppercase(), "reliability_score": 8},
        "language": lang,
        "published_at": "2024-08-17T15:00:00Z",
        "tags": [],
    })
}

pub fn page_json(items: Vec<Value>, next_cursor: Option<&str>) -> Value {
    json!({ "data": items, "next_cursor": next_cursor })
}

pub fn article(id: &str, source: &str, lang: &str) -> Article {
    serde_json::from_value(article_json(id, source, lang)).unwrap()
}

pub fn page(items: &[(&str, &str)], next_cursor: Option<&str>) -> Page {
    Page {
        items: items
            .iter()
            .map(|(id, source)| article(id, source, "en"))
            .collect(),
        next_cursor: next_cursor.map(str::to_string),
    }
}

pub fn ids(articles: &[Article]) -> Vec<&str> {
    articles.iter().map(|a| a.id.as_str()).collect()
}

// ============================================================================
// ScriptedSource
// ============================================================================

struct Route {
    leagues: Option<String>,
    cursor: Option<String>,
    search: Option<String>,
    delay: Duration,
    response: Result<Page, TransportError>,
}

/// In-memory [`NewsSource`] answering by league set, cursor and search text.
///
/// Unmatched queries get an empty final page. Every query is recorded; a
/// response counts as completed only if its delay ran out.
#[derive(Default)]
pub struct ScriptedSource {
    routes: Mutex<Vec<Route>>,
    pub queries: Mutex<Vec<FeedQuery>>,
    pub completed: AtomicUsize,
    pub invalidations: AtomicUsize,
}

impl ScriptedSource {
    /// Register a response. `leagues` is the comma-joined sorted id list.
    pub fn route(
        &self,
        leagues: Option<&str>,
        cursor: Option<&str>,
        search: Option<&str>,
        delay: Duration,
        response: Result<Page, TransportError>,
    ) {
        self.routes.lock().unwrap().push(Route {
            leagues: leagues.map(str::to_string),
            cursor: cursor.map(str::to_string),
            search: search.map(str::to_string),
            delay,
            response,
        });
    }

    pub fn queries(&self) -> Vec<FeedQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.queries()
            .into_iter()
            .filter_map(|q| q.search)
            .collect()
    }
}

#[async_trait]
impl NewsSource for ScriptedSource {
    async fn fetch_page(&self, query: &FeedQuery) -> Result<Page, TransportError> {
        self.queries.lock().unwrap().push(query.clone());

        let leagues = query.league_ids.as_ref().map(|ids| {
            ids.iter().map(String::as_str).collect::<Vec<_>>().join(",")
        });
        let matched = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.leagues == leagues && r.cursor == query.cursor && r.search == query.search)
            .map(|r| (r.delay, r.response.clone()));

        let (delay, response) = matched.unwrap_or((Duration::ZERO, Ok(Page::default())));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        response
    }

    fn invalidate(&self, _league_ids: Option<&std::collections::BTreeSet<String>>) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// TagEngine
// ============================================================================

/// Translation engine that prefixes text with the target language.
///
/// Models install instantly. Text containing `FAIL` is rejected.
#[derive(Default)]
pub struct TagEngine {
    installed: Mutex<HashSet<LanguageCode>>,
    pub downloads: AtomicUsize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TranslationEngine for TagEngine {
    async fn model_available(&self, lang: &LanguageCode) -> bool {
        self.installed.lock().unwrap().contains(lang)
    }

    async fn download_model(
        &self,
        lang: &LanguageCode,
        progress: ProgressReporter,
    ) -> anyhow::Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        progress.report(1.0);
        self.installed.lock().unwrap().insert(lang.clone());
        Ok(())
    }

    async fn translate_text(
        &self,
        text: &str,
        _from: &LanguageCode,
        to: &LanguageCode,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            anyhow::bail!("unsupported input");
        }
        Ok(format!("[{to}] {text}"))
    }
}
