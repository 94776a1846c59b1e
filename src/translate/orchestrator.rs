use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use super::engine::TranslationEngine;
use super::model::{DownloadPolicy, ModelError, ModelManager};
use super::LanguageCode;
use crate::cache::{TranslationCache, TranslationKey, TRANSLATION_CACHE_CAPACITY};
use crate::config::Config;
use crate::news::Article;

/// Articles translated concurrently by [`TranslationOrchestrator::translate_many`].
const BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Translation engine failed: {0}")]
    Engine(String),
    #[error("Translation engine returned empty output")]
    EmptyOutput,
    #[error("Auto-detect is not a valid translation target")]
    AutoTarget,
}

/// Cached, model-gated translation of articles.
///
/// Sits between the feed and the on-device engine: it makes sure the target
/// model is installed, serves repeated strings from the translation cache,
/// and never leaves an article half translated.
pub struct TranslationOrchestrator {
    engine: Arc<dyn TranslationEngine>,
    models: ModelManager,
    cache: TranslationCache,
}

impl TranslationOrchestrator {
    pub fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self::with_cache(engine, TranslationCache::new(TRANSLATION_CACHE_CAPACITY, None))
    }

    pub fn from_config(engine: Arc<dyn TranslationEngine>, config: &Config) -> Self {
        let capacity = match config.translation_cache_capacity {
            0 => TRANSLATION_CACHE_CAPACITY,
            n => n,
        };
        Self::with_cache(engine, TranslationCache::new(capacity, None))
    }

    pub fn with_cache(engine: Arc<dyn TranslationEngine>, cache: TranslationCache) -> Self {
        Self {
            models: ModelManager::new(Arc::clone(&engine)),
            engine,
            cache,
        }
    }

    /// Make sure the model for `lang` is installed.
    ///
    /// No-op for auto-detect and for models already present. Otherwise a
    /// download starts; a download already running for `lang` is cancelled and
    /// replaced, and every caller waits on the replacement.
    pub async fn ensure_model(&self, lang: &LanguageCode) -> Result<(), ModelError> {
        self.models.ensure(lang, DownloadPolicy::Restart).await
    }

    /// Progress of the running download for `lang`, if one is in flight.
    pub fn download_progress(&self, lang: &LanguageCode) -> Option<watch::Receiver<f64>> {
        self.models.progress(lang)
    }

    /// Translate one string, serving repeats from the cache.
    pub async fn translate(
        &self,
        text: &str,
        from: &LanguageCode,
        to: &LanguageCode,
    ) -> Result<String, TranslationError> {
        if to.is_auto() {
            return Err(TranslationError::AutoTarget);
        }
        if from == to || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let key = TranslationKey::new(from, to, text);
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(from = %from, to = %to, "Translation cache hit");
            return Ok(hit);
        }

        // Translation joins a running download instead of restarting it
        self.models.ensure(to, DownloadPolicy::Join).await?;

        let translated = self
            .engine
            .translate_text(text, from, to)
            .await
            .map_err(|e| TranslationError::Engine(e.to_string()))?;

        if translated.trim().is_empty() {
            return Err(TranslationError::EmptyOutput);
        }

        self.cache.put(key, translated.clone());
        Ok(translated)
    }

    /// Translate title and content together.
    ///
    /// Both texts are translated concurrently and committed together: if either
    /// fails the error is returned and the caller's article stays untouched.
    /// Articles already in `target` come back with translation state cleared.
    pub async fn translate_article(
        &self,
        article: &Article,
        target: &LanguageCode,
    ) -> Result<Article, TranslationError> {
        if target.is_auto() {
            return Err(TranslationError::AutoTarget);
        }
        if &article.detected_language == target {
            return Ok(article.without_translation());
        }

        let from = &article.detected_language;
        let (title, content) = futures::try_join!(
            self.translate(&article.title, from, target),
            self.translate(article.translatable_content(), from, target),
        )?;

        article
            .with_translation(title, content)
            .ok_or(TranslationError::EmptyOutput)
    }

    /// Translate a batch, isolating failures per article.
    ///
    /// Output order matches input order. An article that fails to translate is
    /// logged and returned as it came in.
    pub async fn translate_many(&self, articles: &[Article], target: &LanguageCode) -> Vec<Article> {
        stream::iter(articles.iter().cloned())
            .map(move |article| async move {
                match self.translate_article(&article, target).await {
                    Ok(translated) => translated,
                    Err(e) => {
                        tracing::warn!(
                            article_id = %article.id,
                            from = %article.detected_language,
                            to = %target,
                            error = %e,
                            "Article translation failed, keeping original"
                        );
                        article
                    }
                }
            })
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await
    }

    /// Empty the translation cache. Installed models are unaffected.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_translations(&self) -> usize {
        self.cache.len()
    }
}
