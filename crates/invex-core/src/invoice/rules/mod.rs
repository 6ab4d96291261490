//! Deterministic field extractors used when the language models fail.

pub mod amounts;
pub mod dates;
pub mod ids;
pub mod patterns;

pub use amounts::AmountExtractor;
pub use dates::DateExtractor;
pub use ids::{GstExtractor, InvoiceNumberExtractor};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the best occurrence of the field.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A matched value with its confidence and location.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Byte span in the source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}

impl<T> ExtractionMatch<T> {
    fn from_capture(value: T, confidence: f32, matched: regex::Match<'_>) -> Self {
        Self::new(value, confidence, matched.as_str()).with_position(matched.start(), matched.end())
    }
}
