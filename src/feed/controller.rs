use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::state::{FeedError, FeedState};
use crate::config::Config;
use crate::news::{Article, FeedQuery, Filter, FilterKind, NewsSource, Page, DEFAULT_PAGE_LIMIT};
use crate::preferences::{PreferenceChange, PreferenceStore, Preferences};
use crate::translate::{LanguageCode, TranslationOrchestrator};
use crate::util::{catch_task_panic, MAX_SEARCH_QUERY_LENGTH};

/// Buffered events from background tasks.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Settings
// ============================================================================

/// Tuning knobs for a [`FeedController`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub page_size: usize,
    /// Quiet period after the last keystroke before a search runs.
    pub search_debounce: Duration,
    /// Fraction of the loaded list at which the next page is prefetched.
    pub prefetch_threshold: f64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
            search_debounce: Duration::from_millis(500),
            prefetch_threshold: 0.8,
        }
    }
}

impl FeedSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            search_debounce: config.search_debounce(),
            prefetch_threshold: config.prefetch_threshold.clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRequest {
    First,
    Next,
}

/// Results delivered from background tasks to the controller.
///
/// Every variant carries the counter it was spawned under; the controller
/// drops results whose counter no longer matches.
#[derive(Debug)]
enum FeedEvent {
    PageLoaded {
        generation: u64,
        request: PageRequest,
        result: Result<Page, FeedError>,
    },
    SearchDue {
        generation: u64,
    },
    TranslationsReady {
        job: u64,
        session: u64,
        target: LanguageCode,
        articles: Vec<Article>,
    },
    TranslationFailed {
        job: u64,
        error: String,
    },
}

enum Wake {
    Event(FeedEvent),
    Preference(Result<PreferenceChange, RecvError>),
    Idle,
}

// ============================================================================
// FeedController
// ============================================================================

/// Owns one feed session: pagination, filters, search and auto-translation.
///
/// The controller is the only writer of its [`FeedState`]. Operations take
/// `&mut self`, update state synchronously and spawn tokio tasks for any
/// I/O. Task results come back as events that are applied by
/// [`process_next`](Self::process_next) or [`settle`](Self::settle), on the
/// caller's task, so state is never touched concurrently.
///
/// Superseded work is cancelled twice over: its task is aborted, and any
/// result that was already queued is rejected by a generation check.
pub struct FeedController {
    source: Arc<dyn NewsSource>,
    translator: Arc<TranslationOrchestrator>,
    preferences: Arc<PreferenceStore>,
    settings: FeedSettings,
    state: FeedState,

    // Mirrors of the preferences that shape the feed
    favorite_league_ids: BTreeSet<String>,
    blocked_source_ids: HashSet<String>,
    target_language: LanguageCode,
    auto_translate: bool,
    preference_rx: broadcast::Receiver<PreferenceChange>,
    preferences_open: bool,

    /// Query of the current session; next pages reuse it with a cursor.
    session_query: FeedQuery,
    /// Bumped on every session reset; translation results carry it.
    session: u64,

    fetch_generation: u64,
    fetch_handle: Option<JoinHandle<()>>,
    fetch_is_search: bool,

    search_generation: u64,
    search_handle: Option<JoinHandle<()>>,

    next_translation_job: u64,
    translation_handles: HashMap<u64, JoinHandle<()>>,
    /// Job translating the page just fetched; the fetch stays loading until it lands.
    page_translation: Option<u64>,

    event_tx: mpsc::Sender<FeedEvent>,
    event_rx: mpsc::Receiver<FeedEvent>,
}

impl FeedController {
    /// Create a controller. Must be called from within a tokio runtime.
    pub fn new(
        source: Arc<dyn NewsSource>,
        translator: Arc<TranslationOrchestrator>,
        preferences: Arc<PreferenceStore>,
        settings: FeedSettings,
    ) -> Self {
        // Subscribe before the snapshot so no change falls in between
        let preference_rx = preferences.subscribe();
        let prefs = preferences.snapshot();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            source,
            translator,
            preferences,
            session_query: FeedQuery {
                limit: settings.page_size,
                ..FeedQuery::default()
            },
            settings,
            state: FeedState::default(),
            favorite_league_ids: prefs.favorite_league_ids(),
            blocked_source_ids: prefs.blocked_source_ids(),
            target_language: prefs.preferred_language,
            auto_translate: prefs.auto_translate,
            preference_rx,
            preferences_open: true,
            session: 0,
            fetch_generation: 0,
            fetch_handle: None,
            fetch_is_search: false,
            search_generation: 0,
            search_handle: None,
            next_translation_job: 0,
            translation_handles: HashMap::new(),
            page_translation: None,
            event_tx,
            event_rx,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub fn target_language(&self) -> &LanguageCode {
        &self.target_language
    }

    pub fn auto_translate(&self) -> bool {
        self.auto_translate
    }

    /// Leagues the next first page will be requested for.
    ///
    /// Selected league filters win; without any, the favorite leagues are
    /// used; with neither the feed covers all leagues (`None`).
    pub fn effective_league_ids(&self) -> Option<BTreeSet<String>> {
        let selected: BTreeSet<String> = self
            .state
            .selected_filters
            .iter()
            .filter(|f| f.kind == FilterKind::League)
            .map(|f| f.id.clone())
            .collect();

        if !selected.is_empty() {
            Some(selected)
        } else if !self.favorite_league_ids.is_empty() {
            Some(self.favorite_league_ids.clone())
        } else {
            None
        }
    }

    /// True while a fetch, a pending search or a translation job is outstanding.
    pub fn has_pending_work(&self) -> bool {
        self.fetch_handle.is_some()
            || self.search_handle.is_some()
            || !self.translation_handles.is_empty()
    }

    // ========================================================================
    // Pagination
    // ========================================================================

    /// Start a new session from the first page.
    ///
    /// Cancels any in-flight fetch and translation, clears loaded articles and
    /// requests page one for the current filters and search query.
    pub fn load_first_page(&mut self) {
        self.cancel_search_timer();
        self.cancel_fetch();
        self.abort_translations();

        self.session = self.session.wrapping_add(1);
        self.state.reset_pages();
        self.state.is_loading = true;

        let search = Some(self.state.search_query.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        self.session_query = FeedQuery {
            league_ids: self.effective_league_ids(),
            cursor: None,
            limit: self.settings.page_size,
            search,
        };

        tracing::debug!(
            session = self.session,
            leagues = ?self.session_query.league_ids,
            search = ?self.session_query.search,
            "Loading first page"
        );
        self.spawn_fetch(PageRequest::First, self.session_query.clone());
    }

    /// Same as [`load_first_page`](Self::load_first_page).
    pub fn refresh(&mut self) {
        self.load_first_page();
    }

    /// Re-run the first page after an error.
    pub fn retry(&mut self) {
        self.load_first_page();
    }

    /// Drop the cached first page for the current leagues, then reload.
    pub fn force_refresh(&mut self) {
        self.source.invalidate(self.effective_league_ids().as_ref());
        self.load_first_page();
    }

    /// Request the page after the current cursor.
    ///
    /// No-op while loading or when the stream is exhausted.
    pub fn load_next_page(&mut self) {
        if self.state.is_loading || !self.state.has_more {
            return;
        }
        let Some(cursor) = self.state.cursor.clone() else {
            self.state.has_more = false;
            return;
        };

        self.cancel_fetch();
        self.state.is_loading = true;

        let query = FeedQuery {
            cursor: Some(cursor),
            ..self.session_query.clone()
        };
        tracing::debug!(cursor = ?query.cursor, "Loading next page");
        self.spawn_fetch(PageRequest::Next, query);
    }

    /// Prefetch once the user scrolls past the configured share of the list.
    pub fn load_more_if_needed(&mut self, visible_article_id: &str) {
        let Some(index) = self.state.index_of(visible_article_id) else {
            return;
        };
        let len = self.state.articles.len();
        // The last article always qualifies, however short the list
        let threshold = (len as f64 * self.settings.prefetch_threshold).floor() as usize;
        if index >= threshold.min(len.saturating_sub(1)) {
            self.load_next_page();
        }
    }

    // ========================================================================
    // Filters and Search
    // ========================================================================

    /// Select or deselect a filter and restart the session.
    pub fn toggle_filter(&mut self, filter: Filter) {
        if !self.state.selected_filters.remove(&filter) {
            self.state.selected_filters.insert(Filter {
                is_selected: true,
                ..filter
            });
        }
        self.load_first_page();
    }

    /// Record a keystroke; the search runs after the debounce window.
    ///
    /// Each call restarts the window and cancels an in-flight search fetch.
    /// An empty query reverts to the plain feed right away.
    pub fn debounce_search(&mut self, query: &str) {
        let query: String = query.chars().take(MAX_SEARCH_QUERY_LENGTH).collect();
        self.state.search_query = query;

        self.cancel_search_timer();
        if self.fetch_is_search && self.cancel_fetch() {
            self.state.is_loading = false;
        }

        if self.state.search_query.trim().is_empty() {
            tracing::debug!("Search cleared, restoring feed");
            self.load_first_page();
            return;
        }

        self.search_generation = self.search_generation.wrapping_add(1);
        let generation = self.search_generation;
        let delay = self.settings.search_debounce;
        let tx = self.event_tx.clone();

        self.search_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tx.send(FeedEvent::SearchDue { generation }).await {
                tracing::warn!(error = %e, "Failed to deliver search timer (receiver dropped)");
            }
        }));
    }

    // ========================================================================
    // Articles
    // ========================================================================

    /// Flip the local favorite flag. Returns the new value.
    pub fn toggle_favorite(&mut self, article_id: &str) -> Option<bool> {
        let article = self.state.articles.iter_mut().find(|a| a.id == article_id)?;
        article.is_favorite = !article.is_favorite;
        Some(article.is_favorite)
    }

    // ========================================================================
    // Event Processing
    // ========================================================================

    /// Wait for the next background result or preference change and apply it.
    ///
    /// Returns `false` only when there is nothing left that could ever wake
    /// the controller.
    pub async fn process_next(&mut self) -> bool {
        let wake = tokio::select! {
            Some(event) = self.event_rx.recv() => Wake::Event(event),
            change = self.preference_rx.recv(), if self.preferences_open => Wake::Preference(change),
            else => Wake::Idle,
        };

        match wake {
            Wake::Event(event) => self.handle_event(event),
            Wake::Preference(Ok(change)) => self.apply_preference_change(change),
            Wake::Preference(Err(RecvError::Lagged(missed))) => self.resync_preferences(missed),
            Wake::Preference(Err(RecvError::Closed)) => self.preferences_open = false,
            Wake::Idle => return false,
        }
        true
    }

    /// Apply queued preference changes, then process events until no fetch,
    /// search timer or translation job is outstanding.
    pub async fn settle(&mut self) {
        self.drain_preference_changes();
        while self.has_pending_work() {
            if !self.process_next().await {
                break;
            }
        }
    }

    /// Apply every preference change already queued, without waiting.
    pub fn drain_preference_changes(&mut self) {
        while self.preferences_open {
            match self.preference_rx.try_recv() {
                Ok(change) => self.apply_preference_change(change),
                Err(TryRecvError::Lagged(missed)) => self.resync_preferences(missed),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => self.preferences_open = false,
            }
        }
    }

    fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::PageLoaded {
                generation,
                request,
                result,
            } => self.handle_page_loaded(generation, request, result),
            FeedEvent::SearchDue { generation } => {
                if generation != self.search_generation {
                    tracing::debug!(
                        expected = self.search_generation,
                        got = generation,
                        "Ignoring stale search timer"
                    );
                    return;
                }
                self.search_handle = None;
                self.load_first_page();
            }
            FeedEvent::TranslationsReady {
                job,
                session,
                target,
                articles,
            } => self.handle_translations_ready(job, session, target, articles),
            FeedEvent::TranslationFailed { job, error } => {
                self.translation_handles.remove(&job);
                self.finish_page_translation(job);
                tracing::error!(job, error = %error, "Translation task failed");
            }
        }
    }

    fn handle_page_loaded(
        &mut self,
        generation: u64,
        request: PageRequest,
        result: Result<Page, FeedError>,
    ) {
        if generation != self.fetch_generation {
            tracing::debug!(
                expected = self.fetch_generation,
                got = generation,
                "Ignoring stale page (generation mismatch)"
            );
            return;
        }

        self.fetch_handle = None;
        self.fetch_is_search = false;
        self.state.is_loading = false;

        match result {
            Ok(page) => {
                if request == PageRequest::First {
                    self.state.articles.clear();
                }
                let start = self.state.articles.len();
                let received = page.items.len();
                let added = self
                    .state
                    .append_unique(page.items, &self.blocked_source_ids);

                self.state.has_more = page.next_cursor.is_some();
                self.state.cursor = page.next_cursor;
                self.state.last_error = None;
                self.state.loaded = true;

                tracing::debug!(
                    ?request,
                    received,
                    added,
                    has_more = self.state.has_more,
                    "Page applied"
                );

                if self.auto_translate && added > 0 {
                    let slice = self.state.articles[start..].to_vec();
                    if let Some(job) = self.spawn_translation(slice) {
                        self.page_translation = Some(job);
                        self.state.is_loading = true;
                    }
                }
                self.fetch_more_if_starved();
            }
            Err(e) => {
                tracing::warn!(?request, error = %e, "Feed page failed");
                self.state.last_error = Some(e);
            }
        }
    }

    fn handle_translations_ready(
        &mut self,
        job: u64,
        session: u64,
        target: LanguageCode,
        articles: Vec<Article>,
    ) {
        self.translation_handles.remove(&job);
        self.finish_page_translation(job);

        if session != self.session || target != self.target_language {
            tracing::debug!(job, "Ignoring translations from a previous session or language");
            return;
        }

        let translated: HashMap<&str, &Article> = articles
            .iter()
            .filter(|a| a.is_translated)
            .map(|a| (a.id.as_str(), a))
            .collect();

        let mut applied = 0usize;
        for article in &mut self.state.articles {
            if let Some(result) = translated.get(article.id.as_str()) {
                article.adopt_translation(result);
                applied += 1;
            }
        }
        tracing::debug!(job, target = %target, applied, "Translations applied");
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    /// React to a single preference change.
    pub fn apply_preference_change(&mut self, change: PreferenceChange) {
        match change {
            PreferenceChange::FavoriteLeagues(leagues) => {
                self.favorite_league_ids = leagues.into_iter().map(|l| l.id).collect();
                self.refresh();
            }
            PreferenceChange::BlockedSources(sources) => {
                self.blocked_source_ids = sources.into_iter().map(|s| s.id).collect();
                self.refilter_blocked();
            }
            PreferenceChange::PreferredLanguage(lang) => {
                if lang == self.target_language {
                    return;
                }
                self.abort_translations();
                self.target_language = lang;
                if self.auto_translate {
                    self.translate_loaded();
                }
            }
            PreferenceChange::AutoTranslate(enabled) => {
                self.auto_translate = enabled;
                if enabled {
                    self.translate_loaded();
                } else {
                    self.abort_translations();
                }
            }
            PreferenceChange::DarkMode(_) => {}
        }
    }

    /// Missed notifications: adopt the store's current state wholesale.
    fn resync_preferences(&mut self, missed: u64) {
        tracing::warn!(missed, "Preference notifications lagged, resyncing");
        let Preferences {
            favorite_leagues,
            blocked_sources,
            preferred_language,
            auto_translate,
            ..
        } = self.preferences.snapshot();

        self.favorite_league_ids = favorite_leagues.into_iter().map(|l| l.id).collect();
        self.blocked_source_ids = blocked_sources.into_iter().map(|s| s.id).collect();
        self.target_language = preferred_language;
        self.auto_translate = auto_translate;
        self.refresh();
    }

    fn refilter_blocked(&mut self) {
        let removed = self.state.retain_unblocked(&self.blocked_source_ids);
        if removed > 0 {
            tracing::debug!(removed, "Removed articles from blocked sources");
        }
        self.fetch_more_if_starved();
    }

    /// Fetch ahead when filtering left nothing visible but more pages exist.
    fn fetch_more_if_starved(&mut self) {
        if self.state.articles.is_empty() && self.state.has_more && !self.state.is_loading {
            self.load_next_page();
        }
    }

    // ========================================================================
    // Task Management
    // ========================================================================

    fn spawn_fetch(&mut self, request: PageRequest, query: FeedQuery) {
        self.fetch_generation = self.fetch_generation.wrapping_add(1);
        let generation = self.fetch_generation;
        self.fetch_is_search = query.search.is_some();

        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();

        self.fetch_handle = Some(tokio::spawn(async move {
            let result = match catch_task_panic(source.fetch_page(&query)).await {
                Ok(result) => result.map_err(FeedError::from),
                Err(panic_msg) => {
                    tracing::error!(panic = %panic_msg, "Feed fetch task panicked");
                    Err(FeedError::TaskPanicked(panic_msg))
                }
            };

            let event = FeedEvent::PageLoaded {
                generation,
                request,
                result,
            };
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Failed to send page result (receiver dropped)");
            }
        }));
    }

    /// Queue translation of every loaded article not yet translated.
    fn translate_loaded(&mut self) {
        let pending: Vec<Article> = self
            .state
            .articles
            .iter()
            .filter(|a| !a.is_translated)
            .cloned()
            .collect();
        self.spawn_translation(pending);
    }

    /// Spawn a translation job for `articles`. Returns its id, or `None` if
    /// nothing needed translating.
    fn spawn_translation(&mut self, articles: Vec<Article>) -> Option<u64> {
        let target = self.target_language.clone();
        if target.is_auto() {
            return None;
        }
        let articles: Vec<Article> = articles
            .into_iter()
            .filter(|a| !a.is_translated && a.detected_language != target)
            .collect();
        if articles.is_empty() {
            return None;
        }

        self.next_translation_job = self.next_translation_job.wrapping_add(1);
        let job = self.next_translation_job;
        let session = self.session;
        let translator = Arc::clone(&self.translator);
        let tx = self.event_tx.clone();

        tracing::debug!(job, count = articles.len(), target = %target, "Spawning translation job");

        let handle = tokio::spawn(async move {
            let outcome = catch_task_panic(translator.translate_many(&articles, &target)).await;

            let event = match outcome {
                Ok(articles) => FeedEvent::TranslationsReady {
                    job,
                    session,
                    target,
                    articles,
                },
                Err(error) => FeedEvent::TranslationFailed { job, error },
            };
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Failed to send translations (receiver dropped)");
            }
        });
        self.translation_handles.insert(job, handle);
        Some(job)
    }

    fn finish_page_translation(&mut self, job: u64) {
        if self.page_translation == Some(job) {
            self.page_translation = None;
            self.state.is_loading = false;
            self.fetch_more_if_starved();
        }
    }

    /// Abort the primary fetch. Returns whether one was in flight.
    ///
    /// The generation is bumped so a result already queued is discarded too.
    fn cancel_fetch(&mut self) -> bool {
        self.fetch_generation = self.fetch_generation.wrapping_add(1);
        self.fetch_is_search = false;
        match self.fetch_handle.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Aborted in-flight fetch");
                true
            }
            None => false,
        }
    }

    fn cancel_search_timer(&mut self) {
        self.search_generation = self.search_generation.wrapping_add(1);
        if let Some(handle) = self.search_handle.take() {
            handle.abort();
        }
    }

    fn abort_translations(&mut self) {
        for (_, handle) in self.translation_handles.drain() {
            handle.abort();
        }
        if self.page_translation.take().is_some() {
            self.state.is_loading = false;
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        if let Some(handle) = self.fetch_handle.take() {
            handle.abort();
            tracing::debug!("Aborted fetch task on controller drop");
        }
        if let Some(handle) = self.search_handle.take() {
            handle.abort();
        }
        self.abort_translations();
    }
}
