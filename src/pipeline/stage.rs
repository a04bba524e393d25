//! Stage handlers: validation, extraction, categorization, and the error
//! consumer.
//!
//! Each handler owns the message it was handed, runs one stage, and sends the
//! message on to the next channel. Any failure inside a stage (including a
//! panic in third-party parsing code) becomes a FAILED message sent to
//! `stage-error` exactly once. The error consumer logs it and tells observers.
//!
//! ```text
//! stage-tokenizer ─▶ validate ─▶ stage-extractor ─▶ extract ─▶ stage-categorizer ─▶ categorize ─▶ stage-output
//!        │                              │                               │
//!        └──────────────────────────────┴───────────────────────────────┴──▶ stage-error ─▶ error consumer
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use super::categorize::categorize;
use super::error::StageError;
use super::extraction::ExtractionRegistry;
use super::message::{DocumentMessage, MessageError, ProcessingStatus, Stage};
use super::progress::ProgressSubject;
use super::transport::{Channel, MessageHandler, MessageSink, Transport, TransportError};
use super::validation::{ValidationChain, ValidationTarget};
use crate::config::PipelineConfig;

/// Reason recorded when a message reaches the error consumer without one.
const UNEXPLAINED_FAILURE: &str = "Routed to error channel without a failure reason";

pub struct StagePipeline {
    chain: ValidationChain,
    registry: Arc<ExtractionRegistry>,
    progress: Arc<ProgressSubject>,
    sink: Arc<dyn MessageSink>,
}

impl StagePipeline {
    pub fn new(
        chain: ValidationChain,
        registry: Arc<ExtractionRegistry>,
        progress: Arc<ProgressSubject>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            chain,
            registry,
            progress,
            sink,
        }
    }

    /// Default composition: built-in strategies, format then content
    /// validation, and an empty observer list.
    pub fn with_defaults(config: &PipelineConfig, sink: Arc<dyn MessageSink>) -> Self {
        let registry = Arc::new(ExtractionRegistry::with_defaults());
        let chain = ValidationChain::standard(config, registry.clone());
        Self::new(chain, registry, Arc::new(ProgressSubject::new()), sink)
    }

    pub fn progress(&self) -> &Arc<ProgressSubject> {
        &self.progress
    }

    /// Dispatcher entry point: place a new message on the inbound channel.
    pub fn submit(sink: &dyn MessageSink, message: &DocumentMessage) -> Result<(), TransportError> {
        tracing::info!(
            document_id = %message.document_id(),
            document_type = %message.document_type(),
            "Document submitted"
        );
        sink.send(Channel::Tokenizer, message.document_id(), message)
    }

    /// Subscribe every stage handler to its channel.
    pub fn install(self: &Arc<Self>, transport: &dyn Transport) -> Result<(), TransportError> {
        let routes: [(Channel, fn(&StagePipeline, DocumentMessage)); 4] = [
            (Channel::Tokenizer, StagePipeline::handle_validation),
            (Channel::Extractor, StagePipeline::handle_extraction),
            (Channel::Categorizer, StagePipeline::handle_categorization),
            (Channel::Error, StagePipeline::handle_error),
        ];
        for (channel, handle) in routes {
            let pipeline = Arc::clone(self);
            let handler: Arc<dyn MessageHandler> =
                Arc::new(move |message: DocumentMessage| handle(&*pipeline, message));
            transport.subscribe(channel, handler)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    // Stage handlers
    // ═══════════════════════════════════════════════════════════

    /// Accept a PENDING message and run the validation chain.
    pub fn handle_validation(&self, mut message: DocumentMessage) {
        let stage = Stage::Validation;
        if self.is_duplicate(&message, stage) {
            return;
        }
        if let Err(e) = message.begin_processing() {
            self.route_failure(stage, message, StageError::state(stage, e));
            return;
        }
        self.progress.notify_started(message.document_id());

        self.run_stage(stage, message, |pipeline, message| {
            pipeline.chain.validate(&ValidationTarget::from_message(message))?;
            message
                .record_stage(stage)
                .map_err(|e| StageError::state(stage, e))
        });
    }

    /// Extract text with the strategy registered for the document type.
    pub fn handle_extraction(&self, message: DocumentMessage) {
        let stage = Stage::Extraction;
        if self.is_duplicate(&message, stage) {
            return;
        }

        self.run_stage(stage, message, |pipeline, message| {
            expect_processing(message, stage)?;
            let text = pipeline
                .registry
                .extract(message.document_type(), Path::new(message.file_path()))?;
            tracing::debug!(
                document_id = %message.document_id(),
                chars = text.len(),
                "Text extracted"
            );
            message
                .set_content(text)
                .and_then(|()| message.record_stage(stage))
                .map_err(|e| StageError::state(stage, e))
        });
    }

    /// Assign a category and complete the message.
    pub fn handle_categorization(&self, message: DocumentMessage) {
        let stage = Stage::Categorization;
        if self.is_duplicate(&message, stage) {
            return;
        }

        self.run_stage(stage, message, |_, message| {
            expect_processing(message, stage)?;
            let category = categorize(message.content().ok_or(StageError::MissingContent(stage))?);
            message
                .complete(category)
                .map_err(|e| StageError::state(stage, e))
        });
    }

    /// Terminal consumer of `stage-error`: make sure the message is FAILED,
    /// log the full failure context, and notify observers.
    pub fn handle_error(&self, mut message: DocumentMessage) {
        if message.status() != ProcessingStatus::Failed {
            let stage = message.current_stage().unwrap_or(Stage::Validation);
            if let Err(e) = message.fail(stage, UNEXPLAINED_FAILURE) {
                tracing::warn!(
                    document_id = %message.document_id(),
                    status = %message.status(),
                    error = %e,
                    "Error channel received a message that cannot fail"
                );
            }
        }

        let reason = message.error_message().unwrap_or(UNEXPLAINED_FAILURE);
        tracing::error!(
            document_id = %message.document_id(),
            document_type = %message.document_type(),
            file_path = %message.file_path(),
            stage = %message.current_stage().map_or("NONE", |s| s.as_str()),
            reason,
            "Document processing failed"
        );
        self.notify_failed(message.document_id(), reason);
    }

    // ═══════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════

    /// Run `body` for `stage`, then forward the message or divert it to the
    /// error channel.
    fn run_stage<F>(&self, stage: Stage, mut message: DocumentMessage, body: F)
    where
        F: FnOnce(&Self, &mut DocumentMessage) -> Result<(), StageError>,
    {
        let document_id = message.document_id().to_string();
        self.progress
            .notify_progress(&document_id, stage.as_str(), stage.entry_progress());

        let outcome = catch_unwind(AssertUnwindSafe(|| body(self, &mut message)))
            .unwrap_or_else(|_| Err(StageError::Panicked(stage)));
        if let Err(e) = outcome {
            self.route_failure(stage, message, e);
            return;
        }

        self.progress
            .notify_progress(&document_id, stage.as_str(), stage.exit_progress());

        let next = forward_channel(stage);
        if let Err(e) = self.sink.send(next, &document_id, &message) {
            if message.status().is_terminal() {
                // Completed but unpublished; observers still need closure.
                tracing::error!(document_id = %document_id, channel = %next, error = %e, "Failed to publish result");
                self.notify_failed(&document_id, &e.to_string());
            } else {
                self.route_failure(stage, message, e.into());
            }
            return;
        }

        tracing::info!(
            document_id = %document_id,
            stage = %stage,
            next = %next,
            "Stage completed"
        );
        if message.status() == ProcessingStatus::Completed {
            self.progress.notify_completed(&document_id, true);
        }
    }

    /// FAILED transition plus a single send to `stage-error`.
    fn route_failure(&self, stage: Stage, mut message: DocumentMessage, error: StageError) {
        let reason = error.to_string();
        if let Err(e) = message.fail(stage, reason.as_str()) {
            tracing::error!(
                document_id = %message.document_id(),
                stage = %stage,
                error = %e,
                original = %reason,
                "Cannot fail message"
            );
            return;
        }
        tracing::warn!(
            document_id = %message.document_id(),
            stage = %stage,
            kind = error.kind(),
            reason = %reason,
            "Stage failed"
        );

        if let Err(e) = self.sink.send(Channel::Error, message.document_id(), &message) {
            // Nobody else will close out this document.
            tracing::error!(
                document_id = %message.document_id(),
                error = %e,
                "Failed to route message to error channel"
            );
            self.notify_failed(message.document_id(), &reason);
        }
    }

    /// Terminal messages arriving again are dropped.
    fn is_duplicate(&self, message: &DocumentMessage, stage: Stage) -> bool {
        if !message.status().is_terminal() {
            return false;
        }
        tracing::warn!(
            document_id = %message.document_id(),
            stage = %stage,
            status = %message.status(),
            "Dropping message already in a terminal state"
        );
        true
    }

    fn notify_failed(&self, document_id: &str, reason: &str) {
        self.progress.notify_error(document_id, reason);
        self.progress.notify_completed(document_id, false);
    }
}

fn forward_channel(stage: Stage) -> Channel {
    match stage {
        Stage::Validation => Channel::Extractor,
        Stage::Extraction => Channel::Categorizer,
        Stage::Categorization => Channel::Output,
    }
}

fn expect_processing(message: &DocumentMessage, stage: Stage) -> Result<(), StageError> {
    if message.status() == ProcessingStatus::Processing {
        return Ok(());
    }
    Err(StageError::state(
        stage,
        MessageError::InvalidTransition {
            from: message.status(),
            to: ProcessingStatus::Processing,
        },
    ))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
