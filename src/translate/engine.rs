use async_trait::async_trait;
use tokio::sync::watch;

use super::LanguageCode;

/// On-device translation engine.
///
/// The engine owns model storage and the actual inference; this crate only
/// decides when models are needed and caches what the engine produces.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Whether the model for `lang` is already on the device.
    async fn model_available(&self, lang: &LanguageCode) -> bool;

    /// Download the model for `lang`, reporting progress as it goes.
    ///
    /// The future may be dropped at any await point when a newer download for
    /// the same language supersedes it.
    async fn download_model(
        &self,
        lang: &LanguageCode,
        progress: ProgressReporter,
    ) -> anyhow::Result<()>;

    async fn translate_text(
        &self,
        text: &str,
        from: &LanguageCode,
        to: &LanguageCode,
    ) -> anyhow::Result<String>;
}

/// Publishes download progress in `[0.0, 1.0]`.
///
/// Values never go backwards: a report lower than the current value, or NaN,
/// is ignored.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<f64>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: watch::Sender<f64>) -> Self {
        Self { tx }
    }

    /// Detached reporter whose updates nobody observes.
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self { tx }
    }

    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        self.tx.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
    }

    pub fn current(&self) -> f64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.tx.subscribe()
    }
}
