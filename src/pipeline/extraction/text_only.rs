//! Plain text extraction: UTF-8 read, then sanitize.

use std::path::Path;

use super::sanitize::sanitize_extracted_text;
use super::types::ExtractionStrategy;
use super::ExtractionError;

pub struct PlainTextStrategy;

impl ExtractionStrategy for PlainTextStrategy {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn type_keys(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let text =
            String::from_utf8(bytes).map_err(|e| ExtractionError::Encoding(e.to_string()))?;
        Ok(sanitize_extracted_text(&text))
    }
}
