//! Process command - extract fields from a single document.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use tracing::{debug, info};

use invex_core::pipeline::{Disposition, DocumentOutcome};
use invex_core::source::mime_for_extension;
use invex_core::storage::{InsertOutcome, InvoiceStore, MemoryStore, SqliteStore};
use invex_core::{FileDescriptor, Pipeline};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input document (PDF, image, spreadsheet, CSV, DOCX or text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Persist the record when it passes the gate
    #[arg(long)]
    store: bool,

    /// Database file (overrides storage.database_path)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let descriptor = FileDescriptor::new(args.input.display().to_string(), name, mime_for_extension(&extension));

    info!("Processing file: {}", args.input.display());

    let store: Arc<dyn InvoiceStore> = if args.store {
        let path = args.database.clone().unwrap_or_else(|| config.storage.database_path.clone());
        Arc::new(SqliteStore::open(&path)?)
    } else {
        Arc::new(MemoryStore::new())
    };
    let pipeline = Pipeline::from_config(&config, store.clone());

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Extracting {}", descriptor.name));

    let data = fs::read(&args.input)?;
    let outcome = pipeline.process_document(0, &descriptor, &data).await;
    spinner.finish_and_clear();

    if args.store {
        if let Disposition::Accepted { record } = &outcome.disposition {
            match store.insert(record, &config.pipeline.tenant_id).await? {
                InsertOutcome::Inserted => eprintln!("{} Record stored", style("✓").green()),
                InsertOutcome::Duplicate => eprintln!("{} Record already stored", style("ℹ").blue()),
            }
        }
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome)?,
        OutputFormat::Text => format_text(&outcome),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!("{} Output written to {}", style("✓").green(), output_path.display());
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());
    Ok(())
}

fn format_text(outcome: &DocumentOutcome) -> String {
    let mut output = String::new();

    output.push_str(&format!("File: {}\n", outcome.descriptor.name));
    output.push_str(&format!("Status: {}\n", outcome.disposition.label()));
    if let Disposition::Rejected { reason, .. } = &outcome.disposition {
        output.push_str(&format!("Reason: {}\n", reason));
    }
    if let Some(error) = &outcome.extraction_error {
        output.push_str(&format!("Extraction error: {}\n", error));
    }

    if let Some(record) = outcome.disposition.record() {
        output.push('\n');
        output.push_str(&format!("Invoice number: {}\n", record.invoice_number));
        output.push_str(&format!("Date:           {}\n", record.invoice_date));
        output.push_str(&format!("Vendor:         {}\n", record.vendor_name));
        output.push_str(&format!("GST:            {}\n", record.gst_number));
        output.push_str(&format!("Total:          {}\n", record.total_amount));
        output.push_str(&format!("Description:    {}\n", record.description));
        output.push_str(&format!("Method:         {}\n", record.extraction_method));
    }

    if !outcome.attempts.is_empty() {
        output.push_str("\nAttempts:\n");
        for attempt in &outcome.attempts {
            let provider = attempt.provider.as_deref().unwrap_or("-");
            output.push_str(&format!("  {} ({})", attempt.stage.name(), provider));
            if let Some(error) = &attempt.error {
                output.push_str(&format!(": {}", error));
            }
            output.push('\n');
        }
    }

    output
}
