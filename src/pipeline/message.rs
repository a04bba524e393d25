//! Document message: the unit of work threaded through every stage.
//!
//! A message is owned by exactly one stage handler at a time. All status
//! changes go through the transition methods below, which enforce the
//! one-directional state machine:
//!
//! ```text
//! PENDING → PROCESSING → { COMPLETED, FAILED }
//! ```
//!
//! `COMPLETED` and `FAILED` are terminal. `current_stage` only moves forward.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::categorize::Category;

/// Metadata key written by the categorization stage.
pub const CATEGORY_KEY: &str = "category";

// ═══════════════════════════════════════════════════════════
// Status & stage
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages in trajectory order. `Ord` follows that order, which is
/// what keeps `current_stage` monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Validation,
    Extraction,
    Categorization,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Extraction => "EXTRACTION",
            Self::Categorization => "CATEGORIZATION",
        }
    }

    /// Overall progress reported when a document enters this stage.
    pub fn entry_progress(&self) -> u8 {
        match self {
            Self::Validation => 0,
            Self::Extraction => 33,
            Self::Categorization => 66,
        }
    }

    /// Overall progress reported when this stage succeeds.
    pub fn exit_progress(&self) -> u8 {
        match self {
            Self::Validation => 33,
            Self::Extraction => 66,
            Self::Categorization => 100,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Document id must not be empty")]
    EmptyDocumentId,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    #[error("Stage cannot move backwards: {from} -> {to}")]
    StageRegression { from: Stage, to: Stage },

    #[error("Metadata key already set: {0}")]
    MetadataKeyExists(String),
}

// ═══════════════════════════════════════════════════════════
// Message
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMessage {
    document_id: String,
    file_path: String,
    document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_stage: Option<Stage>,
    timestamp: DateTime<Utc>,
}

impl DocumentMessage {
    /// Create a PENDING message. Fails if `document_id` is empty.
    pub fn new(
        document_id: impl Into<String>,
        file_path: impl Into<String>,
        document_type: impl Into<String>,
    ) -> Result<Self, MessageError> {
        let document_id = document_id.into();
        if document_id.trim().is_empty() {
            return Err(MessageError::EmptyDocumentId);
        }
        Ok(Self {
            document_id,
            file_path: file_path.into(),
            document_type: document_type.into(),
            content: None,
            metadata: BTreeMap::new(),
            status: ProcessingStatus::Pending,
            error_message: None,
            current_stage: None,
            timestamp: Utc::now(),
        })
    }

    /// Create a message for a file on disk with a fresh id.
    /// The document type is the lower-cased file extension (empty if none).
    pub fn for_file(path: &Path) -> Self {
        let document_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        Self {
            document_id: Uuid::new_v4().to_string(),
            file_path: path.to_string_lossy().into_owned(),
            document_type,
            content: None,
            metadata: BTreeMap::new(),
            status: ProcessingStatus::Pending,
            error_message: None,
            current_stage: None,
            timestamp: Utc::now(),
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Category assigned by the categorization stage, if any.
    pub fn category(&self) -> Option<Category> {
        self.metadata
            .get(CATEGORY_KEY)
            .and_then(|v| v.as_str())
            .and_then(Category::parse)
    }

    // ── Transitions ─────────────────────────────────────────

    /// PENDING → PROCESSING.
    pub fn begin_processing(&mut self) -> Result<(), MessageError> {
        self.require(ProcessingStatus::Pending, ProcessingStatus::Processing)?;
        self.status = ProcessingStatus::Processing;
        Ok(())
    }

    /// Record that `stage` finished with the message still PROCESSING.
    pub fn record_stage(&mut self, stage: Stage) -> Result<(), MessageError> {
        self.require(ProcessingStatus::Processing, ProcessingStatus::Processing)?;
        self.advance_stage(stage)
    }

    /// Store extracted text. Only the extraction stage calls this.
    pub fn set_content(&mut self, content: String) -> Result<(), MessageError> {
        self.require(ProcessingStatus::Processing, ProcessingStatus::Processing)?;
        self.content = Some(content);
        Ok(())
    }

    /// Add a metadata key. Existing keys are never overwritten.
    pub fn add_metadata(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), MessageError> {
        let key = key.into();
        if self.metadata.contains_key(&key) {
            return Err(MessageError::MetadataKeyExists(key));
        }
        self.metadata.insert(key, value);
        Ok(())
    }

    /// PROCESSING → COMPLETED with the category recorded in metadata.
    pub fn complete(&mut self, category: Category) -> Result<(), MessageError> {
        self.require(ProcessingStatus::Processing, ProcessingStatus::Completed)?;
        self.advance_stage(Stage::Categorization)?;
        self.add_metadata(CATEGORY_KEY, serde_json::Value::from(category.as_str()))?;
        self.status = ProcessingStatus::Completed;
        Ok(())
    }

    /// Any non-terminal status → FAILED.
    ///
    /// `stage` is the stage that observed the failure; it becomes
    /// `current_stage` unless the message already went further.
    pub fn fail(&mut self, stage: Stage, reason: impl Into<String>) -> Result<(), MessageError> {
        if self.status.is_terminal() {
            return Err(MessageError::InvalidTransition {
                from: self.status,
                to: ProcessingStatus::Failed,
            });
        }
        if self.current_stage.map_or(true, |current| stage >= current) {
            self.current_stage = Some(stage);
        }
        self.status = ProcessingStatus::Failed;
        self.error_message = Some(reason.into());
        Ok(())
    }

    fn require(&self, expected: ProcessingStatus, to: ProcessingStatus) -> Result<(), MessageError> {
        if self.status != expected {
            return Err(MessageError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn advance_stage(&mut self, stage: Stage) -> Result<(), MessageError> {
        if let Some(current) = self.current_stage {
            if stage < current {
                return Err(MessageError::StageRegression { from: current, to: stage });
            }
        }
        self.current_stage = Some(stage);
        Ok(())
    }
}

impl fmt::Display for DocumentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DocumentMessage {{ id: {}, type: {}, status: {}, stage: {} }}",
            self.document_id,
            self.document_type,
            self.status,
            self.current_stage.map_or("-", |s| s.as_str()),
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
