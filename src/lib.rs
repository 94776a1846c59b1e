//! Sports-news feed pipeline.
//!
//! Fetches paginated articles from the news API over a retrying transport,
//! caches first pages and translations, and translates articles on the
//! device through a pluggable [`TranslationEngine`]. The [`FeedController`]
//! ties these together into one observable feed session.
//!
//! ```ignore
//! let config = Config::load(&path)?;
//! let repo = Arc::new(NewsRepository::from_config(&config)?);
//! let translator = Arc::new(TranslationOrchestrator::from_config(engine, &config));
//! let prefs = Arc::new(PreferenceStore::from_config(&config));
//!
//! let mut feed = FeedController::new(repo, translator, prefs, FeedSettings::from_config(&config));
//! feed.load_first_page();
//! feed.settle().await;
//! ```

pub mod cache;
pub mod config;
pub mod feed;
pub mod news;
pub mod preferences;
pub mod transport;
pub mod translate;
pub mod util;

pub use config::{Config, ConfigError};
pub use feed::{FeedController, FeedError, FeedSettings, FeedState, FeedStatus};
pub use news::{Article, FeedQuery, Filter, FilterKind, League, NewsRepository, NewsSource, Page, Source};
pub use preferences::{PreferenceChange, PreferenceStore, Preferences};
pub use transport::{TransportClient, TransportError};
pub use translate::{
    LanguageCode, ModelError, ProgressReporter, TranslationEngine, TranslationError,
    TranslationOrchestrator,
};
