//! lexpipe - run legal documents through the stage pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Validate, extract and categorize files
//! lexpipe process contract.pdf memo.docx notes.txt
//! lexpipe process *.pdf --json
//!
//! # Categorize a piece of text
//! lexpipe categorize "This agreement sets forth the terms."
//!
//! # Show effective settings
//! lexpipe config
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use lexpipe_lib::config::{self, PipelineConfig};
use lexpipe_lib::pipeline::categorize::categorize;
use lexpipe_lib::pipeline::composite::group_by_category;
use lexpipe_lib::pipeline::progress::{LoggingObserver, ProgressTracker};
use lexpipe_lib::pipeline::transport::{Channel, LocalBus};
use lexpipe_lib::pipeline::{DocumentMessage, StagePipeline};

/// Legal document stage pipeline.
#[derive(Parser)]
#[command(name = "lexpipe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run files through validation, extraction and categorization
    Process {
        /// Files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the category for a piece of text
    Categorize {
        /// Text to categorize
        text: String,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessReport {
    completed: Vec<DocumentMessage>,
    failed: Vec<DocumentMessage>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    lexpipe_lib::init_tracing();

    match cli.command {
        Command::Process { files, json } => process(files, json).await,
        Command::Categorize { text } => {
            println!("{}", categorize(&text));
            Ok(())
        }
        Command::Config => {
            let config = PipelineConfig::from_env();
            println!("{} {}", config::APP_NAME, config::APP_VERSION);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn process(files: Vec<PathBuf>, json: bool) -> Result<()> {
    let config = PipelineConfig::from_env();
    let bus = LocalBus::new();

    let pipeline = Arc::new(StagePipeline::with_defaults(&config, Arc::new(bus.clone())));
    let tracker = Arc::new(ProgressTracker::new());
    pipeline.progress().add_observer(Arc::new(LoggingObserver));
    pipeline.progress().add_observer(tracker.clone());
    pipeline
        .install(&bus)
        .context("Failed to subscribe stage handlers")?;
    bus.record(Channel::Error);

    for path in &files {
        let message = DocumentMessage::for_file(path);
        StagePipeline::submit(&bus, &message)
            .with_context(|| format!("Failed to submit {}", path.display()))?;
    }
    bus.wait_idle().await;

    let report = ProcessReport {
        completed: bus.drain(Channel::Output),
        failed: bus.take_recorded(Channel::Error),
    };
    if tracker.in_flight() > 0 {
        tracing::warn!(in_flight = tracker.in_flight(), "Documents still tracked after idle");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.completed.is_empty() && !report.failed.is_empty() {
        bail!("No documents processed successfully");
    }
    Ok(())
}

fn print_report(report: &ProcessReport) {
    for message in &report.completed {
        let category = message
            .category()
            .map_or("UNKNOWN", |c| c.as_str());
        println!("ok    {}  {}", category, message.file_path());
    }
    for message in &report.failed {
        println!(
            "fail  {}  {}",
            message.file_path(),
            message.error_message().unwrap_or("unknown error")
        );
    }

    if !report.completed.is_empty() {
        println!();
        print!("{}", group_by_category("Processed documents", &report.completed));
    }
    println!(
        "\n{} completed, {} failed",
        report.completed.len(),
        report.failed.len()
    );
}
