use thiserror::Error;

use super::extraction::ExtractionError;
use super::message::{MessageError, Stage};
use super::transport::TransportError;
use super::validation::ValidationFailure;

/// Everything that can go wrong inside one stage handler.
///
/// Handlers convert these into a FAILED message on the error channel; a
/// `StageError` never crosses a stage boundary. `Display` is the text stored
/// as the message's `errorMessage`.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("{0}")]
    UnsupportedType(ExtractionError),

    #[error("Extraction failed: {0}")]
    Extraction(ExtractionError),

    #[error("Internal error during {stage}: {source}")]
    State {
        stage: Stage,
        #[source]
        source: MessageError,
    },

    #[error("Internal error during {0}")]
    Panicked(Stage),

    #[error("Internal error during {0}: no extracted content")]
    MissingContent(Stage),

    #[error("Failed to forward message: {0}")]
    Transport(#[from] TransportError),
}

impl From<ExtractionError> for StageError {
    fn from(e: ExtractionError) -> Self {
        if e.is_unsupported_type() {
            Self::UnsupportedType(e)
        } else {
            Self::Extraction(e)
        }
    }
}

impl StageError {
    pub fn state(stage: Stage, source: MessageError) -> Self {
        Self::State { stage, source }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::Extraction(_) => "extraction",
            Self::State { .. } => "state",
            Self::Panicked(_) => "panic",
            Self::MissingContent(_) => "missing_content",
            Self::Transport(_) => "transport",
        }
    }
}
