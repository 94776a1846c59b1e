use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// ISO language code, normalized to lower case.
///
/// The pseudo-value [`LanguageCode::AUTO`] means "detect the source language";
/// it is accepted as a translation source but never as a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageCode(Arc<str>);

impl LanguageCode {
    pub const AUTO: &'static str = "auto";

    pub fn new(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Self::auto();
        }
        Self(Arc::from(normalized))
    }

    pub fn auto() -> Self {
        Self(Arc::from(Self::AUTO))
    }

    pub fn is_auto(&self) -> bool {
        &*self.0 == Self::AUTO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LanguageCode {
    fn from(code: String) -> Self {
        Self::new(&code)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0.to_string()
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
