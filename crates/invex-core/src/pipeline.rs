//! Batch orchestration.
//!
//! For each listed file: fail it when its type is not supported, skip it
//! when its record already exists, download,
//! extract text, run the staged field extractor, apply the acceptance rule
//! and persist accepted records. Documents are processed in batches, either
//! one after another or concurrently within a batch; both modes produce the
//! same per-document outcome.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::panic_message;
use crate::extract::TextExtractor;
use crate::gate::{Route, Verdict, accept};
use crate::invoice::{InvoiceExtractor, has_total_candidate};
use crate::llm::ProviderRegistry;
use crate::models::config::{InvexConfig, PipelineConfig};
use crate::models::document::{ExtractedText, FileDescriptor, FileKind, SourceDocument};
use crate::models::invoice::{ExtractionAttempt, InvoiceRecord};
use crate::source::FileSource;
use crate::storage::{InsertOutcome, InvoiceStore};
use crate::vision::VisionChain;

/// Failure reported for files no extractor handles.
pub const UNSUPPORTED_FILE_TYPE: &str = "unsupported file type";

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    /// Passed the gate (and was stored, when run through a batch).
    Accepted { record: InvoiceRecord },
    /// Failed the gate.
    Rejected { record: InvoiceRecord, reason: String },
    /// A record for this file already exists.
    Duplicate,
    /// Unsupported type, download, storage or a panic stopped the document.
    Failed { error: String },
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Accepted { .. } => "accepted",
            Disposition::Rejected { .. } => "rejected",
            Disposition::Duplicate => "duplicate",
            Disposition::Failed { .. } => "failed",
        }
    }

    pub fn record(&self) -> Option<&InvoiceRecord> {
        match self {
            Disposition::Accepted { record } | Disposition::Rejected { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Per-document result handed back to the caller for routing and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub index: usize,
    pub descriptor: FileDescriptor,
    pub disposition: Disposition,
    pub route: Route,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    pub attempts: Vec<ExtractionAttempt>,
    pub model_calls: usize,
    #[serde(skip)]
    pub text: ExtractedText,
}

impl DocumentOutcome {
    fn new(index: usize, descriptor: &FileDescriptor, disposition: Disposition, route: Route) -> Self {
        Self {
            index,
            descriptor: descriptor.clone(),
            disposition,
            route,
            extraction_error: None,
            attempts: Vec::new(),
            model_calls: 0,
            text: ExtractedText::empty(),
        }
    }

    fn duplicate(index: usize, descriptor: &FileDescriptor) -> Self {
        Self::new(index, descriptor, Disposition::Duplicate, Route::Valid)
    }

    fn failed(index: usize, descriptor: &FileDescriptor, error: impl Into<String>) -> Self {
        Self::new(
            index,
            descriptor,
            Disposition::Failed { error: error.into() },
            Route::Invalid,
        )
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub found: usize,
    pub parsed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: &DocumentOutcome) {
        match outcome.disposition {
            Disposition::Accepted { .. } => {
                self.parsed += 1;
                self.valid += 1;
            }
            Disposition::Rejected { .. } => {
                self.parsed += 1;
                self.invalid += 1;
            }
            Disposition::Duplicate => self.duplicates += 1,
            Disposition::Failed { .. } => self.failed += 1,
        }
    }
}

/// Outcomes of a run, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub summary: BatchSummary,
    /// Batches whose inputs were dumped after a panic or storage failure.
    pub failed_batches: Vec<usize>,
}

#[derive(Serialize)]
struct FailedBatchDump<'a> {
    batch: usize,
    documents: Vec<FailedDocument<'a>>,
}

#[derive(Serialize)]
struct FailedDocument<'a> {
    descriptor: &'a FileDescriptor,
    status: &'static str,
    lines: &'a [String],
}

/// The document pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    extractor: TextExtractor,
    fields: InvoiceExtractor,
    store: Arc<dyn InvoiceStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        extractor: TextExtractor,
        fields: InvoiceExtractor,
        store: Arc<dyn InvoiceStore>,
    ) -> Self {
        Self {
            config,
            extractor,
            fields,
            store,
        }
    }

    /// Wire providers, the vision chain and the store from configuration.
    pub fn from_config(config: &InvexConfig, store: Arc<dyn InvoiceStore>) -> Self {
        let timeout = Duration::from_secs(config.providers.timeout_secs);
        let registry = Arc::new(ProviderRegistry::from_config(&config.providers));
        let vision = Arc::new(VisionChain::from_config(&config.vision, timeout));

        Self::new(
            config.pipeline.clone(),
            TextExtractor::new().with_vision(vision),
            InvoiceExtractor::new(registry).with_max_prompt_chars(config.pipeline.max_prompt_chars),
            store,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract and judge one document without touching the store.
    pub async fn process_document(&self, index: usize, descriptor: &FileDescriptor, bytes: &[u8]) -> DocumentOutcome {
        self.process_source(index, SourceDocument::new(descriptor.clone(), bytes.to_vec()))
            .await
    }

    async fn process_source(&self, index: usize, mut document: SourceDocument) -> DocumentOutcome {
        let extraction = self.extractor.extract(&document.descriptor, &document.content).await;
        document.content = Vec::new();
        document.extraction_error = extraction.error;

        let descriptor = &document.descriptor;
        let record = InvoiceRecord::new(&descriptor.id, &descriptor.name).with_tenant(&self.config.tenant_id);

        let has_total = has_total_candidate(extraction.text.lines());
        debug!(doc = index, file = %descriptor.name, has_total, "pre-filter");

        let (report, verdict) = if self.config.skip_without_total_hint && !has_total {
            let reason = "no plausible total line".to_string();
            (None, Verdict::Rejected(reason))
        } else {
            let report = self.fields.extract(index, record.clone(), &extraction.text).await;
            let verdict = accept(&report.record, self.config.acceptance);
            (Some(report), verdict)
        };

        let route = Route::from(&verdict);
        let (record, attempts, model_calls) = match report {
            Some(report) => (report.record, report.attempts, report.model_calls),
            None => (record.with_raw_text(extraction.text.joined()), Vec::new(), 0),
        };
        let disposition = match verdict {
            Verdict::Accepted => Disposition::Accepted { record },
            Verdict::Rejected(reason) => Disposition::Rejected { record, reason },
        };

        info!(
            doc = index,
            file = %descriptor.name,
            outcome = disposition.label(),
            model_calls,
            "document processed"
        );

        DocumentOutcome {
            index,
            descriptor: document.descriptor,
            disposition,
            route,
            extraction_error: document.extraction_error,
            attempts,
            model_calls,
            text: extraction.text,
        }
    }

    /// Process every descriptor, in batches.
    pub async fn run(&self, descriptors: &[FileDescriptor], source: &dyn FileSource) -> BatchReport {
        self.run_with_progress(descriptors, source, &|_| {}).await
    }

    /// [`Pipeline::run`], calling `on_done` as each document finishes.
    pub async fn run_with_progress(
        &self,
        descriptors: &[FileDescriptor],
        source: &dyn FileSource,
        on_done: &(dyn Fn(&DocumentOutcome) + Sync),
    ) -> BatchReport {
        let mut report = BatchReport::default();
        report.summary.found = descriptors.len();
        let batch_size = self.config.batch_size.max(1);

        for (batch, chunk) in descriptors.chunks(batch_size).enumerate() {
            let base = batch * batch_size;
            info!(batch, size = chunk.len(), concurrent = self.config.concurrent, "starting batch");

            let results = if self.config.concurrent {
                join_all(
                    chunk
                        .iter()
                        .enumerate()
                        .map(|(i, descriptor)| self.guarded(base + i, descriptor, source, on_done)),
                )
                .await
            } else {
                let mut results = Vec::with_capacity(chunk.len());
                for (i, descriptor) in chunk.iter().enumerate() {
                    results.push(self.guarded(base + i, descriptor, source, on_done).await);
                }
                results
            };

            let catastrophic = results.iter().any(|(_, catastrophic)| *catastrophic);
            let outcomes: Vec<DocumentOutcome> = results.into_iter().map(|(outcome, _)| outcome).collect();
            if catastrophic {
                self.dump_failed_batch(batch, &outcomes).await;
                report.failed_batches.push(batch);
            }
            for outcome in outcomes {
                report.summary.count(&outcome);
                report.outcomes.push(outcome);
            }
        }

        let summary = &report.summary;
        info!(
            found = summary.found,
            parsed = summary.parsed,
            valid = summary.valid,
            invalid = summary.invalid,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "run complete"
        );
        report
    }

    /// Run one document, turning a panic into a failed outcome. The flag
    /// marks failures that compromise the whole batch.
    async fn guarded(
        &self,
        index: usize,
        descriptor: &FileDescriptor,
        source: &dyn FileSource,
        on_done: &(dyn Fn(&DocumentOutcome) + Sync),
    ) -> (DocumentOutcome, bool) {
        let result = AssertUnwindSafe(self.handle(index, descriptor, source))
            .catch_unwind()
            .await;

        let (outcome, catastrophic) = match result {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(doc = index, file = %descriptor.name, panic = %message, "document panicked");
                (DocumentOutcome::failed(index, descriptor, format!("panic: {}", message)), true)
            }
        };
        on_done(&outcome);
        (outcome, catastrophic)
    }

    async fn handle(&self, index: usize, descriptor: &FileDescriptor, source: &dyn FileSource) -> (DocumentOutcome, bool) {
        if descriptor.kind() == FileKind::Unknown {
            warn!(doc = index, file = %descriptor.name, "unsupported file type");
            return (DocumentOutcome::failed(index, descriptor, UNSUPPORTED_FILE_TYPE), false);
        }

        match self.store.exists(&descriptor.id).await {
            Ok(true) => {
                debug!(doc = index, file = %descriptor.name, "already ingested, skipping");
                return (DocumentOutcome::duplicate(index, descriptor), false);
            }
            Ok(false) => {}
            Err(e) => return (DocumentOutcome::failed(index, descriptor, e.to_string()), true),
        }

        let bytes = match source.download(&descriptor.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(doc = index, file = %descriptor.name, error = %e, "download failed");
                return (DocumentOutcome::failed(index, descriptor, e.to_string()), false);
            }
        };

        let mut outcome = self
            .process_source(index, SourceDocument::new(descriptor.clone(), bytes))
            .await;

        let Disposition::Accepted { record } = &outcome.disposition else {
            return (outcome, false);
        };

        match self.persist(record).await {
            Ok(InsertOutcome::Inserted) => (outcome, false),
            Ok(InsertOutcome::Duplicate) => {
                outcome.disposition = Disposition::Duplicate;
                (outcome, false)
            }
            Err(e) => {
                error!(doc = index, file = %descriptor.name, error = %e, "failed to store record");
                outcome.disposition = Disposition::Failed { error: e.to_string() };
                outcome.route = Route::Invalid;
                (outcome, true)
            }
        }
    }

    async fn persist(&self, record: &InvoiceRecord) -> crate::error::Result<InsertOutcome> {
        if self.store.exists(&record.file_id).await? {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(self.store.insert(record, &self.config.tenant_id).await?)
    }

    async fn dump_failed_batch(&self, batch: usize, outcomes: &[DocumentOutcome]) {
        let dump = FailedBatchDump {
            batch,
            documents: outcomes
                .iter()
                .map(|o| FailedDocument {
                    descriptor: &o.descriptor,
                    status: o.disposition.label(),
                    lines: o.text.lines(),
                })
                .collect(),
        };
        let path: &Path = &self.config.failed_batch_path;

        let written = match serde_json::to_vec_pretty(&dump) {
            Ok(json) => tokio::fs::write(path, json).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match written {
            Ok(()) => warn!(batch, path = %path.display(), "batch failed, inputs dumped"),
            Err(e) => error!(batch, path = %path.display(), error = %e, "could not dump failed batch"),
        }
    }
}
