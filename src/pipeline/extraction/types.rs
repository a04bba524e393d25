use std::path::Path;

use super::ExtractionError;

/// Type-specific text extraction.
///
/// A strategy declares the document-type keys it handles; the registry is
/// built from those declarations, never from inspecting the concrete type.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lower-case document-type keys this strategy handles (e.g. `["pdf"]`).
    fn type_keys(&self) -> &'static [&'static str];

    /// Read the document at `path` and return its text.
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}
