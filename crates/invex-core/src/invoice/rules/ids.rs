//! Invoice number and GST identification number.

use super::patterns::{GST_NUMBER, INVOICE_NUMBER};
use super::{ExtractionMatch, FieldExtractor};
use crate::normalize::clean_invoice_number;

/// Invoice, bill, challan or receipt number.
pub struct InvoiceNumberExtractor;

impl InvoiceNumberExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InvoiceNumberExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for InvoiceNumberExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        INVOICE_NUMBER
            .captures_iter(text)
            .filter_map(|caps| {
                let raw = caps.get(1)?;
                let number = clean_invoice_number(raw.as_str());
                (!number.is_empty()).then(|| ExtractionMatch::from_capture(number, 0.8, raw))
            })
            .collect()
    }
}

/// 15-character GSTIN following a GST label.
pub struct GstExtractor;

impl GstExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GstExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for GstExtractor {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        GST_NUMBER
            .captures_iter(text)
            .filter_map(|caps| {
                let raw = caps.get(1)?;
                Some(ExtractionMatch::from_capture(raw.as_str().to_ascii_uppercase(), 0.9, raw))
            })
            .collect()
    }
}
