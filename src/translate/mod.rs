//! On-demand article translation.
//!
//! - [`engine`] - the on-device engine seam and download progress reporting
//! - [`model`] - single-flight model downloads keyed by language
//! - [`orchestrator`] - cached, model-gated translation of strings and articles

mod engine;
mod language;
mod model;
mod orchestrator;

pub use engine::{ProgressReporter, TranslationEngine};
pub use language::LanguageCode;
pub use model::ModelError;
pub use orchestrator::{TranslationError, TranslationOrchestrator};
