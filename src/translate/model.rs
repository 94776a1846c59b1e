use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::engine::{ProgressReporter, TranslationEngine};
use super::LanguageCode;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The engine reports no model for the language even after a download.
    #[error("Translation model unavailable for {0}")]
    Unavailable(LanguageCode),
    #[error("Model download for {lang} failed: {reason}")]
    DownloadFailed { lang: LanguageCode, reason: String },
    /// The download was aborted and nothing replaced it.
    #[error("Model download for {0} was cancelled")]
    Cancelled(LanguageCode),
}

/// How a request treats a download already running for the same language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DownloadPolicy {
    /// Cancel the running download and start over (explicit requests).
    Restart,
    /// Await the running download if there is one (implicit, from translation).
    Join,
}

type DownloadFuture = Shared<BoxFuture<'static, Result<(), ModelError>>>;
type DownloadMap = Arc<Mutex<HashMap<LanguageCode, InFlightDownload>>>;

#[derive(Clone)]
struct InFlightDownload {
    id: u64,
    abort: AbortHandle,
    future: DownloadFuture,
    progress: watch::Receiver<f64>,
}

/// Single-flight model downloads, keyed by language.
///
/// At most one download per language runs at a time. Starting a new one
/// aborts the previous task; callers that were awaiting the aborted task
/// follow the replacement, so everyone ends up awaiting the latest handle.
/// A finished download removes its own entry even when nobody awaits it.
pub(crate) struct ModelManager {
    engine: Arc<dyn TranslationEngine>,
    downloads: DownloadMap,
    next_id: AtomicU64,
}

impl ModelManager {
    pub(crate) fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self {
            engine,
            downloads: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<LanguageCode, InFlightDownload>> {
        lock_downloads(&self.downloads)
    }

    pub(crate) async fn ensure(
        &self,
        lang: &LanguageCode,
        policy: DownloadPolicy,
    ) -> Result<(), ModelError> {
        if lang.is_auto() {
            return Ok(());
        }

        if self.engine.model_available(lang).await {
            return Ok(());
        }

        let mut current = self.begin(lang, policy);
        loop {
            match current.future.clone().await {
                Err(ModelError::Cancelled(_)) => match self.latest(lang) {
                    Some(next) if next.id != current.id => {
                        tracing::debug!(lang = %lang, from = current.id, to = next.id, "Following superseding model download");
                        current = next;
                    }
                    _ => {
                        // The replacement may already have finished and left
                        return if self.engine.model_available(lang).await {
                            Ok(())
                        } else {
                            Err(ModelError::Cancelled(lang.clone()))
                        };
                    }
                },
                result => {
                    self.finish(lang, current.id);
                    return result;
                }
            }
        }
    }

    /// Progress of the running download for `lang`, if any.
    pub(crate) fn progress(&self, lang: &LanguageCode) -> Option<watch::Receiver<f64>> {
        self.lock().get(lang).map(|d| d.progress.clone())
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn latest(&self, lang: &LanguageCode) -> Option<InFlightDownload> {
        self.lock().get(lang).cloned()
    }

    fn finish(&self, lang: &LanguageCode, id: u64) {
        remove_download(&self.downloads, lang, id);
    }

    fn begin(&self, lang: &LanguageCode, policy: DownloadPolicy) -> InFlightDownload {
        let mut downloads = self.lock();

        if let Some(existing) = downloads.get(lang) {
            match policy {
                DownloadPolicy::Join => return existing.clone(),
                DownloadPolicy::Restart => {
                    existing.abort.abort();
                    tracing::debug!(lang = %lang, id = existing.id, "Aborted superseded model download");
                }
            }
        }

        let download = self.spawn_download(lang);
        downloads.insert(lang.clone(), download.clone());
        download
    }

    fn spawn_download(&self, lang: &LanguageCode) -> InFlightDownload {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let reporter = ProgressReporter::new(progress_tx);
        let engine = Arc::clone(&self.engine);
        let task_lang = lang.clone();
        let downloads = Arc::clone(&self.downloads);

        tracing::info!(lang = %lang, id, "Starting model download");

        // `begin` holds the map lock across spawn and insert, so the entry
        // exists before the task can remove it.
        let handle = tokio::spawn(async move {
            let result = download(engine, &task_lang, reporter).await;
            remove_download(&downloads, &task_lang, id);
            result
        });

        let abort = handle.abort_handle();
        let join_lang = lang.clone();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(ModelError::Cancelled(join_lang)),
                Err(e) => Err(ModelError::DownloadFailed {
                    lang: join_lang,
                    reason: format!("download task panicked: {e}"),
                }),
            }
        }
        .boxed()
        .shared();

        InFlightDownload {
            id,
            abort,
            future,
            progress: progress_rx,
        }
    }
}

fn lock_downloads(
    downloads: &Mutex<HashMap<LanguageCode, InFlightDownload>>,
) -> MutexGuard<'_, HashMap<LanguageCode, InFlightDownload>> {
    downloads
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the entry for `lang` if it still belongs to download `id`.
fn remove_download(
    downloads: &Mutex<HashMap<LanguageCode, InFlightDownload>>,
    lang: &LanguageCode,
    id: u64,
) {
    let mut downloads = lock_downloads(downloads);
    if downloads.get(lang).is_some_and(|d| d.id == id) {
        downloads.remove(lang);
    }
}

async fn download(
    engine: Arc<dyn TranslationEngine>,
    lang: &LanguageCode,
    reporter: ProgressReporter,
) -> Result<(), ModelError> {
    engine
        .download_model(lang, reporter.clone())
        .await
        .map_err(|e| ModelError::DownloadFailed {
            lang: lang.clone(),
            reason: e.to_string(),
        })?;

    if !engine.model_available(lang).await {
        return Err(ModelError::Unavailable(lang.clone()));
    }

    reporter.report(1.0);
    tracing::info!(lang = %lang, "Model download complete");
    Ok(())
}

impl Drop for ModelManager {
    fn drop(&mut self) {
        for download in self.lock().values() {
            download.abort.abort();
        }
    }
}
