use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::translate::LanguageCode;

// ============================================================================
// Source / League
// ============================================================================

/// Publisher of an article. Shared between the articles it published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "icon")]
    pub icon_url: Option<String>,
    /// 0–10, clamped on decode.
    #[serde(default, deserialize_with = "clamp_reliability")]
    pub reliability_score: u8,
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn clamp_reliability<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.clamp(0.0, 10.0).round() as u8)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default, alias = "logo")]
    pub logo_url: Option<String>,
}

impl PartialEq for League {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for League {}

impl Hash for League {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Article
// ============================================================================

/// A news article as decoded from the API.
///
/// Everything except the translation fields and `is_favorite` is an immutable
/// snapshot of the payload. Translation fields are local state and are never
/// read from the wire. Equality is by `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(rename = "content", default)]
    pub raw_content: String,
    #[serde(default)]
    pub summary: String,
    pub source: Arc<Source>,
    #[serde(rename = "language", default = "LanguageCode::auto")]
    pub detected_language: LanguageCode,
    #[serde(rename = "published_at")]
    pub publish_date: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub translated_title: Option<String>,
    #[serde(skip)]
    pub translated_content: Option<String>,
    #[serde(skip)]
    pub is_translated: bool,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Article {
    /// Text that stands in for the body when translating.
    pub fn translatable_content(&self) -> &str {
        if self.raw_content.trim().is_empty() {
            &self.summary
        } else {
            &self.raw_content
        }
    }

    /// Returns a copy carrying both translated fields.
    ///
    /// Returns `None` if either text is empty, so `is_translated` can never be
    /// set on a half-translated article.
    pub fn with_translation(&self, title: String, content: String) -> Option<Self> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return None;
        }
        Some(Self {
            translated_title: Some(title),
            translated_content: Some(content),
            is_translated: true,
            ..self.clone()
        })
    }

    /// Returns a copy with translation state cleared.
    pub fn without_translation(&self) -> Self {
        Self {
            translated_title: None,
            translated_content: None,
            is_translated: false,
            ..self.clone()
        }
    }

    /// Copies translation state from `other` (same article, translated elsewhere).
    pub(crate) fn adopt_translation(&mut self, other: &Article) {
        if other.is_translated {
            self.translated_title = other.translated_title.clone();
            self.translated_content = other.translated_content.clone();
            self.is_translated = true;
        }
    }

    /// Title to display: the translation when present.
    pub fn display_title(&self) -> &str {
        self.translated_title.as_deref().unwrap_or(&self.title)
    }
}

impl PartialEq for Article {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Article {}

impl Hash for Article {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Filter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    League,
    Team,
    Player,
    Tag,
}

/// A user-selectable feed filter. `is_selected` is transient UI state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub id: String,
    pub name: String,
    pub kind: FilterKind,
    #[serde(skip)]
    pub is_selected: bool,
}

impl Filter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            is_selected: false,
        }
    }

    pub fn league(league: &League) -> Self {
        Self::new(league.id.clone(), league.name.clone(), FilterKind::League)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Filter {}

impl Hash for Filter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// Page
// ============================================================================

/// One page of the feed. `next_cursor == None` means end of stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(rename = "data")]
    pub items: Vec<Article>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
