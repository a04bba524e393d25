//! Rule-based document categorization.
//!
//! Pure and total: every input text maps to exactly one [`Category`].
//! Rules are evaluated in a fixed order and the first match wins, so a text
//! mentioning both "contract" and "court" is a `CONTRACT`. Keyword sets
//! overlap in intent; reordering the rules changes output.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Unknown,
    Contract,
    LegalDocument,
    Corporate,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Contract => "CONTRACT",
            Self::LegalDocument => "LEGAL_DOCUMENT",
            Self::Corporate => "CORPORATE",
            Self::General => "GENERAL",
        }
    }

    /// Inverse of [`Category::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(Self::Unknown),
            "CONTRACT" => Some(Self::Contract),
            "LEGAL_DOCUMENT" => Some(Self::LegalDocument),
            "CORPORATE" => Some(Self::Corporate),
            "GENERAL" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules in precedence order. Matching is case-insensitive substring.
const RULES: &[(Category, &[&str])] = &[
    (
        Category::Contract,
        &["contract", "agreement", "terms", "conditions"],
    ),
    (
        Category::LegalDocument,
        &["court", "judgment", "lawsuit", "litigation"],
    ),
    (
        Category::Corporate,
        &["company", "corporation", "board", "shareholder"],
    ),
];

/// Assign a category to extracted text.
pub fn categorize(text: &str) -> Category {
    if text.trim().is_empty() {
        return Category::Unknown;
    }

    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::General)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
