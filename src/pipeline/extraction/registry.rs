//! Extraction strategy registry.
//!
//! Built once at startup from the full set of strategies, then read-only.
//! Lookup is a case-insensitive exact match on the declared document type;
//! an unknown type is an error, never a fallback.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::docx::DocxStrategy;
use super::pdf::PdfStrategy;
use super::text_only::PlainTextStrategy;
use super::types::ExtractionStrategy;
use super::ExtractionError;

/// Collects strategies before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    strategies: HashMap<String, Arc<dyn ExtractionStrategy>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under a single type key.
    pub fn register(
        mut self,
        type_key: &str,
        strategy: Arc<dyn ExtractionStrategy>,
    ) -> Result<Self, ExtractionError> {
        let key = normalize(type_key);
        if self.strategies.contains_key(&key) {
            return Err(ExtractionError::DuplicateType(key));
        }
        self.strategies.insert(key, strategy);
        Ok(self)
    }

    /// Register `strategy` under every key it declares.
    pub fn register_declared(
        self,
        strategy: Arc<dyn ExtractionStrategy>,
    ) -> Result<Self, ExtractionError> {
        strategy
            .type_keys()
            .iter()
            .try_fold(self, |builder, key| builder.register(key, strategy.clone()))
    }

    pub fn build(self) -> ExtractionRegistry {
        ExtractionRegistry {
            strategies: self.strategies,
        }
    }
}

/// Immutable map from document type to extraction strategy.
pub struct ExtractionRegistry {
    strategies: HashMap<String, Arc<dyn ExtractionStrategy>>,
}

impl ExtractionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build from a closed list of strategies, each registered under its
    /// declared keys. Two strategies claiming one key is an error.
    pub fn from_strategies(
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
    ) -> Result<Self, ExtractionError> {
        strategies
            .into_iter()
            .try_fold(RegistryBuilder::new(), RegistryBuilder::register_declared)
            .map(RegistryBuilder::build)
    }

    /// Plain text, PDF and Word strategies.
    ///
    /// Registered through the same duplicate check as any other list. An
    /// overlap is logged and leaves the registry empty, so every document
    /// then fails extraction as an unsupported type.
    pub fn with_defaults() -> Self {
        let defaults: Vec<Arc<dyn ExtractionStrategy>> = vec![
            Arc::new(PlainTextStrategy),
            Arc::new(PdfStrategy),
            Arc::new(DocxStrategy),
        ];
        Self::from_strategies(defaults).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Built-in extraction strategies overlap");
            RegistryBuilder::new().build()
        })
    }

    /// Strategy for `document_type`, or `UnsupportedType` naming it.
    pub fn resolve(&self, document_type: &str) -> Result<&dyn ExtractionStrategy, ExtractionError> {
        self.strategies
            .get(&normalize(document_type))
            .map(|s| s.as_ref())
            .ok_or_else(|| ExtractionError::UnsupportedType(document_type.to_string()))
    }

    pub fn supports(&self, document_type: &str) -> bool {
        self.strategies.contains_key(&normalize(document_type))
    }

    /// Resolve and run in one step.
    pub fn extract(&self, document_type: &str, path: &Path) -> Result<String, ExtractionError> {
        let strategy = self.resolve(document_type)?;
        tracing::debug!(
            document_type,
            strategy = strategy.name(),
            path = %path.display(),
            "Extracting text"
        );
        strategy.extract_text(path)
    }

    /// Registered type keys, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

fn normalize(type_key: &str) -> String {
    type_key.trim().to_lowercase()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
