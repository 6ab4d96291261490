//! Invoice number cleaning.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // One leading label: "Invoice No:", "Bill #", "Challan Number", "No.", "#"...
    static ref LABEL_PREFIX: Regex = Regex::new(
        r"(?i)^\s*(?:(?:tax\s+)?(?:invoice|inv|bill|challan|receipt|do)\s*(?:number\b|num\b\.?|no\b\.?|#)|(?:tax\s+)?invoice\b|bill\b|number\b|num\b\.?|no\b\.?|#)\s*[:#.\-]?\s*"
    ).unwrap();
}

fn is_edge_noise(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '#' | ',' | ';')
}

/// Strip one recognized label prefix and surrounding punctuation.
pub fn clean_invoice_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let rest = match LABEL_PREFIX.find(trimmed) {
        Some(label) => &trimmed[label.end()..],
        None => trimmed,
    };
    rest.trim_matches(is_edge_noise).to_string()
}
