//! Core library for invoice document extraction.
//!
//! This crate provides:
//! - Text materialization for PDFs, images, spreadsheets, CSV and Word files
//! - A tiered vision OCR chain with a local ONNX fallback
//! - Staged field extraction (model prompts, deep retry, regex fallback, rescue)
//! - Field normalization, an acceptance gate and idempotent persistence
//! - Batch orchestration over a pluggable file source

pub mod error;
pub mod extract;
pub mod gate;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod source;
pub mod storage;
pub mod vision;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{InvexError, Result};
pub use extract::{Extraction, TextExtractor};
pub use gate::{Route, Verdict, accept};
pub use invoice::{InvoiceExtractor, regex_parse};
pub use llm::{LanguageModel, ProviderRegistry};
pub use models::config::{AcceptancePolicy, InvexConfig, PipelineConfig};
pub use models::document::{ExtractedText, FileDescriptor, FileKind};
pub use models::invoice::{ExtractionReport, InvoiceRecord};
pub use pipeline::{BatchReport, BatchSummary, Disposition, DocumentOutcome, Pipeline};
pub use retry::RetryPolicy;
pub use source::{FileSource, LocalFolderSource, RetryingSource};
pub use storage::{InvoiceStore, MemoryStore, SqliteStore, TenantScope};
pub use vision::{VisionBackend, VisionChain};
