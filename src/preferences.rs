//! Observable user preferences.
//!
//! Config values seed the initial state; every mutation writes the field and
//! then synchronously notifies subscribers with a [`PreferenceChange`].
//! Persisting preferences (and debouncing those writes) is left to the host
//! application, which can subscribe like any other listener.
use std::collections::{BTreeSet, HashSet};
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::news::{League, Source};
use crate::translate::LanguageCode;

/// Buffered change events per subscriber before it starts lagging.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Preferences
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub favorite_leagues: Vec<League>,
    pub blocked_sources: Vec<Source>,
    pub preferred_language: LanguageCode,
    pub auto_translate: bool,
    pub dark_mode: bool,
}

impl Preferences {
    pub fn from_config(config: &Config) -> Self {
        Self {
            favorite_leagues: Vec::new(),
            blocked_sources: Vec::new(),
            preferred_language: config.preferred_language.clone(),
            auto_translate: config.auto_translate,
            dark_mode: false,
        }
    }

    pub fn is_league_favorite(&self, league: &League) -> bool {
        self.favorite_leagues.contains(league)
    }

    pub fn is_source_blocked(&self, source: &Source) -> bool {
        self.blocked_sources.contains(source)
    }

    pub fn favorite_league_ids(&self) -> BTreeSet<String> {
        self.favorite_leagues.iter().map(|l| l.id.clone()).collect()
    }

    pub fn blocked_source_ids(&self) -> HashSet<String> {
        self.blocked_sources.iter().map(|s| s.id.clone()).collect()
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A single field change, carrying the new value.
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceChange {
    FavoriteLeagues(Vec<League>),
    BlockedSources(Vec<Source>),
    PreferredLanguage(LanguageCode),
    AutoTranslate(bool),
    DarkMode(bool),
}

// ============================================================================
// PreferenceStore
// ============================================================================

/// Shared preference state with change notification.
///
/// Reads are cheap snapshots. Writes that do not change the stored value are
/// dropped without notifying anyone.
pub struct PreferenceStore {
    prefs: RwLock<Preferences>,
    changes: broadcast::Sender<PreferenceChange>,
}

impl PreferenceStore {
    pub fn new(initial: Preferences) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            prefs: RwLock::new(initial),
            changes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Preferences::from_config(config))
    }

    /// Subscribe to future changes. Earlier changes are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<PreferenceChange> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self) -> Preferences {
        self.prefs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_league_favorite(&self, league: &League) -> bool {
        self.snapshot().is_league_favorite(league)
    }

    pub fn is_source_blocked(&self, source: &Source) -> bool {
        self.snapshot().is_source_blocked(source)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn set_favorite_leagues(&self, leagues: Vec<League>) {
        let leagues = dedup_by_id(leagues, |l| l.id.clone());
        self.update(|prefs| {
            // League equality is by id, so this compares ids in order
            if prefs.favorite_leagues == leagues {
                return None;
            }
            prefs.favorite_leagues = leagues.clone();
            Some(PreferenceChange::FavoriteLeagues(leagues))
        });
    }

    /// Add the league if absent, remove it otherwise.
    pub fn toggle_favorite_league(&self, league: League) {
        let mut leagues = self.snapshot().favorite_leagues;
        match leagues.iter().position(|l| *l == league) {
            Some(idx) => {
                leagues.remove(idx);
            }
            None => leagues.push(league),
        }
        self.set_favorite_leagues(leagues);
    }

    pub fn set_blocked_sources(&self, sources: Vec<Source>) {
        let sources = dedup_by_id(sources, |s| s.id.clone());
        self.update(|prefs| {
            if prefs.blocked_sources == sources {
                return None;
            }
            prefs.blocked_sources = sources.clone();
            Some(PreferenceChange::BlockedSources(sources))
        });
    }

    /// Block the source if not blocked, unblock it otherwise.
    pub fn toggle_blocked_source(&self, source: Source) {
        let mut sources = self.snapshot().blocked_sources;
        match sources.iter().position(|s| *s == source) {
            Some(idx) => {
                sources.remove(idx);
            }
            None => sources.push(source),
        }
        self.set_blocked_sources(sources);
    }

    pub fn set_preferred_language(&self, lang: LanguageCode) {
        self.update(|prefs| {
            if prefs.preferred_language == lang {
                return None;
            }
            prefs.preferred_language = lang.clone();
            Some(PreferenceChange::PreferredLanguage(lang))
        });
    }

    pub fn set_auto_translate(&self, enabled: bool) {
        self.update(|prefs| {
            if prefs.auto_translate == enabled {
                return None;
            }
            prefs.auto_translate = enabled;
            Some(PreferenceChange::AutoTranslate(enabled))
        });
    }

    pub fn set_dark_mode(&self, enabled: bool) {
        self.update(|prefs| {
            if prefs.dark_mode == enabled {
                return None;
            }
            prefs.dark_mode = enabled;
            Some(PreferenceChange::DarkMode(enabled))
        });
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    /// Apply `mutate` under the write lock, then notify outside it.
    fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Preferences) -> Option<PreferenceChange>,
    {
        let change = {
            let mut prefs = self
                .prefs
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            mutate(&mut prefs)
        };

        if let Some(change) = change {
            tracing::debug!(?change, "Preference changed");
            // Err only means there are no subscribers right now
            let _ = self.changes.send(change);
        }
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

fn dedup_by_id<T, F>(items: Vec<T>, id: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(id(item))).collect()
}

// ============================================================================
// Tests
// ============================================================================
