//! Validation chain: an ordered list of independent validators.
//!
//! Validators run in registration order and the chain stops at the first
//! failure; later validators are never invoked. New checks are added by
//! appending a validator, never by editing an existing one.

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use super::extraction::ExtractionRegistry;
use super::message::DocumentMessage;
use crate::config::PipelineConfig;

/// A rejected document: which validator said no, and why.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationFailure {
    pub validator: &'static str,
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(validator: &'static str, reason: impl Into<String>) -> Self {
        Self {
            validator,
            reason: reason.into(),
        }
    }
}

/// What a validator gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationTarget<'a> {
    pub document_id: &'a str,
    pub path: &'a Path,
    pub document_type: &'a str,
    /// Text already known for the document, if any.
    pub content: Option<&'a str>,
}

impl<'a> ValidationTarget<'a> {
    pub fn from_message(message: &'a DocumentMessage) -> Self {
        Self {
            document_id: message.document_id(),
            path: Path::new(message.file_path()),
            document_type: message.document_type(),
            content: message.content(),
        }
    }
}

/// A single, stateless check.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, target: &ValidationTarget<'_>) -> Result<(), ValidationFailure>;
}

// ═══════════════════════════════════════════════════════════
// Chain
// ═══════════════════════════════════════════════════════════

/// Immutable ordered sequence of validators.
#[derive(Clone, Default)]
pub struct ValidationChain {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a chain with `validator` appended.
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Format check followed by content check.
    pub fn standard(config: &PipelineConfig, registry: Arc<ExtractionRegistry>) -> Self {
        Self::new()
            .with(FormatValidator::from_config(config))
            .with(ContentValidator::new(registry))
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run validators in order, stopping at the first failure.
    pub fn validate(&self, target: &ValidationTarget<'_>) -> Result<(), ValidationFailure> {
        for validator in &self.validators {
            if let Err(failure) = validator.validate(target) {
                tracing::warn!(
                    document_id = target.document_id,
                    validator = validator.name(),
                    reason = %failure.reason,
                    "Validation failed"
                );
                return Err(failure);
            }
            tracing::debug!(
                document_id = target.document_id,
                validator = validator.name(),
                "Validation passed"
            );
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Format
// ═══════════════════════════════════════════════════════════

/// File must exist, stay under the size ceiling, and carry a supported extension.
pub struct FormatValidator {
    max_file_bytes: u64,
    supported_extensions: Vec<String>,
}

impl FormatValidator {
    pub fn new(max_file_bytes: u64, supported_extensions: &[&str]) -> Self {
        Self {
            max_file_bytes,
            supported_extensions: supported_extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            supported_extensions: config.supported_extensions.clone(),
        }
    }
}

impl Validator for FormatValidator {
    fn name(&self) -> &'static str {
        "format"
    }

    fn validate(&self, target: &ValidationTarget<'_>) -> Result<(), ValidationFailure> {
        let metadata = match std::fs::metadata(target.path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(ValidationFailure::new(self.name(), "File does not exist")),
        };

        if metadata.len() > self.max_file_bytes {
            return Err(ValidationFailure::new(
                self.name(),
                format!("File size exceeds limit ({} bytes)", metadata.len()),
            ));
        }

        let extension = target
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.supported_extensions.iter().any(|s| *s == extension) {
            return Err(ValidationFailure::new(
                self.name(),
                format!("Unsupported file extension: {extension}"),
            ));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Content
// ═══════════════════════════════════════════════════════════

static LEGAL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(contract|agreement|party|clause|terms|conditions|law|legal|court|judgment)")
        .unwrap_or_else(|e| panic!("invalid legal terms regex: {e}"))
});

const MIN_SENTENCES: usize = 2;

/// Text must use legal terminology and contain at least two sentences.
///
/// Inspects the document's known content, or a preview extracted through
/// the registry when nothing has been extracted yet. The preview is not
/// written back to the message. A preview that cannot be read is left to
/// the extraction stage, which reports it as an extraction failure.
pub struct ContentValidator {
    registry: Arc<ExtractionRegistry>,
}

impl ContentValidator {
    pub fn new(registry: Arc<ExtractionRegistry>) -> Self {
        Self { registry }
    }

    fn text_for<'a>(&self, target: &ValidationTarget<'a>) -> Option<Cow<'a, str>> {
        if let Some(content) = target.content {
            return Some(Cow::Borrowed(content));
        }
        match self.registry.extract(target.document_type, target.path) {
            Ok(text) => Some(Cow::Owned(text)),
            Err(e) => {
                tracing::debug!(
                    document_id = target.document_id,
                    error = %e,
                    "No text preview, content check deferred to extraction"
                );
                None
            }
        }
    }
}

impl Validator for ContentValidator {
    fn name(&self) -> &'static str {
        "content"
    }

    fn validate(&self, target: &ValidationTarget<'_>) -> Result<(), ValidationFailure> {
        let Some(text) = self.text_for(target) else {
            return Ok(());
        };

        if !LEGAL_TERMS.is_match(&text) {
            return Err(ValidationFailure::new(self.name(), "No legal terminology found"));
        }

        let sentences = text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count();
        if sentences < MIN_SENTENCES {
            return Err(ValidationFailure::new(
                self.name(),
                "Insufficient sentence structure",
            ));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
