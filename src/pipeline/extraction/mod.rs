pub mod types;
pub mod registry;
pub mod sanitize;
pub mod text_only;
pub mod pdf;
pub mod docx;

pub use types::*;
pub use registry::*;
pub use sanitize::*;
pub use text_only::PlainTextStrategy;
pub use pdf::PdfStrategy;
pub use docx::DocxStrategy;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No extraction strategy found for document type: {0}")]
    UnsupportedType(String),

    #[error("Extraction strategy already registered for document type: {0}")]
    DuplicateType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("DOCX parsing failed: {0}")]
    DocxParsing(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),
}

impl ExtractionError {
    /// True for the "no strategy for this type" case, which callers must not
    /// paper over with a default strategy.
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Self::UnsupportedType(_))
    }
}
