//! Invoice field extraction: pre-filter, prompts, regex rules and the
//! staged extractor that ties them together.

mod fallback;
pub mod machine;
pub mod prefilter;
pub mod prompts;
pub mod rules;

pub use fallback::regex_parse;
pub use machine::{InvoiceExtractor, REGEX_MANUAL, SKIPPED_NO_TEXT, State};
pub use prefilter::has_total_candidate;
