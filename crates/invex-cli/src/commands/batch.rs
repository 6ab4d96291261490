//! Batch command - run a folder of documents through the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use invex_core::models::document::FileKind;
use invex_core::pipeline::{BatchReport, Disposition, DocumentOutcome};
use invex_core::source::{FileSource, LocalFolderSource, RetryingSource};
use invex_core::{InvoiceRecord, Pipeline, PipelineConfig, RetryPolicy, Route, SqliteStore};

use super::load_config;

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Folder holding the documents
    #[arg(required = true)]
    folder: PathBuf,

    /// Process each batch concurrently
    #[arg(long)]
    concurrent: bool,

    /// Documents per batch (overrides pipeline.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Tenant that owns the stored records
    #[arg(long)]
    tenant: Option<String>,

    /// Database file (overrides storage.database_path)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Leave files in place instead of filing them into valid/invalid folders
    #[arg(long)]
    no_move: bool,

    /// Write a per-file summary CSV
    #[arg(long)]
    summary: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;

    if !args.folder.is_dir() {
        anyhow::bail!("Folder not found: {}", args.folder.display());
    }
    if args.concurrent {
        config.pipeline.concurrent = true;
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(tenant) = &args.tenant {
        config.pipeline.tenant_id = tenant.clone();
    }

    let source = RetryingSource::new(
        LocalFolderSource::new(&args.folder),
        RetryPolicy::from_config(&config.retry),
    );

    let files = source.list("").await?;
    if files.is_empty() {
        println!("{} No files in {}", style("ℹ").blue(), args.folder.display());
        return Ok(());
    }
    let unsupported = files.iter().filter(|f| f.kind() == FileKind::Unknown).count();
    debug!(total = files.len(), unsupported, "listed inbox");
    println!("{} Found {} files to process", style("ℹ").blue(), files.len());

    let database = args.database.clone().unwrap_or_else(|| config.storage.database_path.clone());
    let store = Arc::new(SqliteStore::open(&database)?);
    let pipeline = Pipeline::from_config(&config, store);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );
    let on_done = |outcome: &DocumentOutcome| {
        pb.set_message(outcome.descriptor.name.clone());
        pb.inc(1);
    };

    let report = pipeline.run_with_progress(&files, &source, &on_done).await;
    pb.finish_and_clear();

    if !args.no_move {
        file_documents(&source, &report, &config.pipeline).await;
    }

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &report)?;
        println!("{} Summary written to {}", style("✓").green(), summary_path.display());
    }

    print_summary(&report, start);
    Ok(())
}

/// Move every processed file into its route's folder. Failures are logged.
async fn file_documents(
    source: &dyn FileSource,
    report: &BatchReport,
    config: &PipelineConfig,
) {
    for outcome in &report.outcomes {
        let destination = outcome.route.destination(config);
        if let Err(e) = source
            .move_to(&outcome.descriptor.id, &outcome.descriptor.name, destination)
            .await
        {
            warn!(file = %outcome.descriptor.name, destination, error = %e, "failed to move file");
        }
    }
}

fn write_summary(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file",
        "status",
        "route",
        "extraction_method",
        "invoice_number",
        "invoice_date",
        "vendor_name",
        "total_amount",
        "error",
    ])?;

    for outcome in &report.outcomes {
        let record = outcome.disposition.record();
        let field = |f: fn(&InvoiceRecord) -> String| record.map(f).unwrap_or_default();
        let error = match &outcome.disposition {
            Disposition::Rejected { reason, .. } => reason.clone(),
            Disposition::Failed { error } => error.clone(),
            _ => outcome.extraction_error.clone().unwrap_or_default(),
        };
        let route = match outcome.route {
            Route::Valid => "valid",
            Route::Invalid => "invalid",
        };

        wtr.write_record([
            outcome.descriptor.name.clone(),
            outcome.disposition.label().to_string(),
            route.to_string(),
            field(|r| r.extraction_method.clone()),
            field(|r| r.invoice_number.clone()),
            field(|r| r.invoice_date.clone()),
            field(|r| r.vendor_name.clone()),
            field(|r| r.total_amount.to_string()),
            error,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn print_summary(report: &BatchReport, start: Instant) {
    let summary = &report.summary;

    println!();
    println!("{}", style("Batch Processing Summary").bold());
    println!("  Found:      {}", summary.found);
    println!("  Parsed:     {}", summary.parsed);
    println!("  Valid:      {}", style(summary.valid).green());
    println!("  Invalid:    {}", style(summary.invalid).yellow());
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Failed:     {}", style(summary.failed).red());
    if !report.failed_batches.is_empty() {
        println!(
            "{} {} batch(es) failed, inputs dumped for inspection",
            style("⚠").yellow(),
            report.failed_batches.len()
        );
    }
    println!("  Time:       {:.2}s", start.elapsed().as_secs_f64());
}
