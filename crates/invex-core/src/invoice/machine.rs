//! Escalating field extraction.
//!
//! A document moves through explicit states, each of which takes the record
//! built so far and returns it together with the next state:
//!
//! ```text
//! EmptyText ──────────────────────────────────────────────► Done
//! Primary ──ok, complete──────────────────────────────────► Done
//!    │  └──ok, fields missing──► DeepRetry ──complete─────► Done
//!    │                              │    └──still missing─► Rescue ─► Done
//!    └──failed──────────────────────┴─failed─► RegexFallback ─► Rescue ─► Done
//! ```
//!
//! Rescue runs only while a critical field is still missing.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::fallback::regex_parse;
use super::prompts::{SYSTEM_PROMPT, deep_retry_prompt, primary_prompt, rescue_prompt};
use crate::error::Result;
use crate::llm::{ProviderRegistry, coerce_object};
use crate::models::document::ExtractedText;
use crate::models::invoice::{
    CriticalField, DEFAULT_DESCRIPTION, ExtractionAttempt, ExtractionReport, ExtractionStage, InvoiceRecord,
};

/// Provenance tag for documents without text.
pub const SKIPPED_NO_TEXT: &str = "Skipped (No Text)";

/// Provenance tag for the regex stage.
pub const REGEX_MANUAL: &str = "Regex (Manual)";

/// Default cap on the document text sent with any prompt.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 12_000;

/// Extraction state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    EmptyText,
    Primary,
    DeepRetry(Vec<CriticalField>),
    RegexFallback,
    Rescue,
    Done,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::EmptyText => "empty_text",
            State::Primary => "primary",
            State::DeepRetry(_) => "deep_retry",
            State::RegexFallback => "regex_fallback",
            State::Rescue => "rescue",
            State::Done => "done",
        }
    }
}

/// Per-document bookkeeping shared by the state functions.
struct Run<'a> {
    index: usize,
    text: &'a str,
    prompt_text: &'a str,
    attempts: Vec<ExtractionAttempt>,
    model_calls: usize,
}

impl Run<'_> {
    fn record_attempt(
        &mut self,
        stage: ExtractionStage,
        provider: Option<String>,
        produced: Vec<String>,
        record: &InvoiceRecord,
        error: Option<String>,
    ) {
        self.attempts.push(ExtractionAttempt {
            stage,
            provider,
            produced,
            missing: record.missing_critical(),
            error,
        });
    }
}

/// Staged invoice field extractor backed by a provider registry.
pub struct InvoiceExtractor {
    registry: Arc<ProviderRegistry>,
    max_prompt_chars: usize,
}

impl InvoiceExtractor {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    /// Run every applicable stage for one document.
    ///
    /// `record` carries the file and tenant identity; `index` only labels
    /// log lines.
    pub async fn extract(&self, index: usize, record: InvoiceRecord, text: &ExtractedText) -> ExtractionReport {
        let joined = text.joined();
        let mut run = Run {
            index,
            text: &joined,
            prompt_text: truncate_chars(&joined, self.max_prompt_chars),
            attempts: Vec::new(),
            model_calls: 0,
        };

        let mut record = record.with_raw_text(joined.clone());
        let mut state = if text.is_empty() {
            State::EmptyText
        } else {
            State::Primary
        };

        loop {
            let from = state.name();
            let (next_record, next) = match state {
                State::EmptyText => self.empty_text(&mut run, record),
                State::Primary => self.primary(&mut run, record).await,
                State::DeepRetry(missing) => self.deep_retry(&mut run, record, missing).await,
                State::RegexFallback => self.regex_fallback(&mut run, record),
                State::Rescue => self.rescue(&mut run, record).await,
                State::Done => break,
            };
            record = next_record;
            info!(
                doc = run.index,
                from,
                to = next.name(),
                missing = ?record.missing_critical(),
                "extraction transition"
            );
            state = next;
        }

        if !record.has_value("description") {
            record.description = DEFAULT_DESCRIPTION.to_string();
        }

        ExtractionReport {
            record,
            attempts: run.attempts,
            model_calls: run.model_calls,
        }
    }

    /// One model call coerced to a JSON object.
    async fn ask(&self, run: &mut Run<'_>, prompt: &str) -> Result<(Map<String, Value>, String)> {
        run.model_calls += 1;
        let completion = self.registry.call(SYSTEM_PROMPT, prompt).await?;
        let fields = coerce_object(&completion.text)?;
        Ok((fields, completion.provider))
    }

    fn empty_text(&self, run: &mut Run<'_>, mut record: InvoiceRecord) -> (InvoiceRecord, State) {
        record.extraction_method = SKIPPED_NO_TEXT.to_string();
        run.record_attempt(ExtractionStage::EmptyText, None, Vec::new(), &record, None);
        (record, State::Done)
    }

    async fn primary(&self, run: &mut Run<'_>, mut record: InvoiceRecord) -> (InvoiceRecord, State) {
        let prompt = primary_prompt(run.prompt_text);
        match self.ask(run, &prompt).await {
            Ok((fields, provider)) => {
                let produced = record.merge_object(&fields, true);
                record.extraction_method = format!("AI ({})", provider);
                run.record_attempt(ExtractionStage::Primary, Some(provider), produced, &record, None);

                let missing = record.missing_critical();
                let next = if missing.is_empty() {
                    State::Done
                } else {
                    State::DeepRetry(missing)
                };
                (record, next)
            }
            Err(e) => {
                debug!(doc = run.index, error = %e, "primary extraction failed");
                run.record_attempt(ExtractionStage::Primary, None, Vec::new(), &record, Some(e.to_string()));
                (record, State::RegexFallback)
            }
        }
    }

    async fn deep_retry(
        &self,
        run: &mut Run<'_>,
        mut record: InvoiceRecord,
        missing: Vec<CriticalField>,
    ) -> (InvoiceRecord, State) {
        let prompt = deep_retry_prompt(run.prompt_text, &record.fields_json(), &missing);
        match self.ask(run, &prompt).await {
            Ok((fields, provider)) => {
                let produced = record.merge_object(&fields, false);
                if !produced.is_empty() {
                    record.extraction_method = format!("AI Deep Retry ({})", provider);
                }
                run.record_attempt(ExtractionStage::DeepRetry, Some(provider), produced, &record, None);

                let next = if record.missing_critical().is_empty() {
                    State::Done
                } else {
                    State::Rescue
                };
                (record, next)
            }
            Err(e) => {
                debug!(doc = run.index, error = %e, "deep retry failed");
                run.record_attempt(ExtractionStage::DeepRetry, None, Vec::new(), &record, Some(e.to_string()));
                (record, State::RegexFallback)
            }
        }
    }

    fn regex_fallback(&self, run: &mut Run<'_>, mut record: InvoiceRecord) -> (InvoiceRecord, State) {
        let produced = record.merge_object(&regex_parse(run.text), false);
        record.extraction_method = REGEX_MANUAL.to_string();
        run.record_attempt(ExtractionStage::RegexFallback, None, produced, &record, None);

        let next = if record.missing_critical().is_empty() {
            State::Done
        } else {
            State::Rescue
        };
        (record, next)
    }

    async fn rescue(&self, run: &mut Run<'_>, mut record: InvoiceRecord) -> (InvoiceRecord, State) {
        let missing = record.missing_critical();
        let prompt = rescue_prompt(run.prompt_text, &missing);
        match self.ask(run, &prompt).await {
            Ok((fields, provider)) => {
                let produced = record.merge_object(&fields, false);
                if !produced.is_empty() {
                    record.extraction_method = format!("{} + Rescue ({})", record.extraction_method, provider);
                }
                run.record_attempt(ExtractionStage::Rescue, Some(provider), produced, &record, None);
            }
            Err(e) => {
                debug!(doc = run.index, error = %e, "rescue failed, keeping record");
                run.record_attempt(ExtractionStage::Rescue, None, Vec::new(), &record, Some(e.to_string()));
            }
        }
        (record, State::Done)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
