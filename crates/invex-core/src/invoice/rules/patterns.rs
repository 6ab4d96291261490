//! Regex patterns for invoice field recovery.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Invoice number: a label followed by a token containing at least one digit.
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)(?:\b(?:invoice|bill|challan|receipt|inv)|#)\s*(?:number|num|no)?\.?\s*[:#]?\s*([A-Z0-9\-/]*\d[A-Z0-9\-/]*)"
    ).unwrap();

    // Labelled dates with a numeric or abbreviated month between separators.
    pub static ref LABELLED_DATE: Regex = Regex::new(
        r"(?i)\b(?:date|dated|journey|boarding)\s*:?\s*(\d{1,2}[/\-.\s]+(?:\d{1,2}|[A-Z]{3,9})[/\-.\s]+\d{2,4})\b"
    ).unwrap();

    // Labelled dates written month first: "Invoice Date: Jan 5 2024".
    pub static ref LABELLED_NAMED_DATE: Regex = Regex::new(
        r"(?i)\b(?:date|dated|journey|boarding)\s*:?\s*([A-Z]{3,9}\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{2,4})\b"
    ).unwrap();

    // Any date-looking token, used when no label is present.
    pub static ref ORPHANED_DATE: Regex = Regex::new(
        r"\b(\d{1,2}[-/](?:[A-Za-z]{3}|\d{1,2})[-/]\d{2,4})\b"
    ).unwrap();

    // GST identification number.
    pub static ref GST_NUMBER: Regex = Regex::new(
        r"(?i)\b(?:gstin|gst)\s*(?:no\.?|number)?\s*:?\s*([0-9A-Z]{15})\b"
    ).unwrap();

    // High-confidence total labels, travel and retail.
    pub static ref TOTAL_VALUE: Regex = Regex::new(
        r"(?i)(?:total invoice value|invoice value|total fare|ticket fare|fare\s*\(all\s*inclusive\))[^\d\n]{0,20}?([\d,]*\d(?:\.\d+)?)"
    ).unwrap();

    pub static ref TOTAL_DUE: Regex = Regex::new(
        r"(?i)(?:grand total|total amount|amount due|total payment|amount payable)[^\d\n]{0,20}?([\d,]*\d(?:\.\d+)?)"
    ).unwrap();

    // Last resort: any "total" line ending in a two-decimal figure.
    pub static ref TOTAL_LINE: Regex = Regex::new(
        r"(?i)total.*?[:₹$]\s*([\d,]+\.\d{2})"
    ).unwrap();

    // Pre-filter keywords.
    pub static ref TOTAL_HINT: Regex = Regex::new(
        r"(?i)total|amount\s+due"
    ).unwrap();

    // A standalone zero amount or the word "zero".
    pub static ref EXPLICIT_ZERO: Regex = Regex::new(
        r"(?i)(?:^|[^\d.,])0+(?:\.0+)?(?:$|[^\d.,])|\bzero\b"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn first<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
        re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
    }

    #[test]
    fn test_invoice_number_needs_a_digit() {
        assert_eq!(first(&INVOICE_NUMBER, "Invoice No: INV-2024-001"), Some("INV-2024-001"));
        assert_eq!(first(&INVOICE_NUMBER, "Bill No. 5512"), Some("5512"));
        assert_eq!(first(&INVOICE_NUMBER, "Challan #A/77"), Some("A/77"));
        assert_eq!(first(&INVOICE_NUMBER, "Invoice Date: Jan 5 2024"), None);
    }

    #[test]
    fn test_dates() {
        assert_eq!(first(&LABELLED_DATE, "Dated: 12/09/2025"), Some("12/09/2025"));
        assert_eq!(first(&LABELLED_DATE, "Date of issue 12 Sep 2025"), None);
        assert_eq!(first(&LABELLED_DATE, "Boarding 03-Mar-24"), Some("03-Mar-24"));
        assert_eq!(first(&LABELLED_NAMED_DATE, "Invoice Date: Jan 5 2024"), Some("Jan 5 2024"));
        assert_eq!(first(&LABELLED_NAMED_DATE, "Date: March 21st, 2023"), Some("March 21st, 2023"));
        assert_eq!(first(&ORPHANED_DATE, "printed 12-Sep-2025 10:00"), Some("12-Sep-2025"));
    }

    #[test]
    fn test_gst() {
        assert_eq!(first(&GST_NUMBER, "GSTIN: 29ABCDE1234F1Z5"), Some("29ABCDE1234F1Z5"));
        assert_eq!(first(&GST_NUMBER, "GST No. 29ABCDE1234F1Z5"), Some("29ABCDE1234F1Z5"));
        assert_eq!(first(&GST_NUMBER, "GST 18%"), None);
    }

    #[test]
    fn test_total_patterns() {
        assert_eq!(first(&TOTAL_DUE, "Grand Total: $250.00"), Some("250.00"));
        assert_eq!(first(&TOTAL_DUE, "Amount Payable Rs. 1,499"), Some("1,499"));
        assert_eq!(first(&TOTAL_VALUE, "Total Fare (INR) 2,345.50"), Some("2,345.50"));
        assert_eq!(first(&TOTAL_LINE, "Sub total ₹ 99.00"), Some("99.00"));
    }

    #[test]
    fn test_explicit_zero() {
        assert!(EXPLICIT_ZERO.is_match("Total: 0.00"));
        assert!(EXPLICIT_ZERO.is_match("Amount due 0"));
        assert!(EXPLICIT_ZERO.is_match("Total: zero rupees"));
        assert!(!EXPLICIT_ZERO.is_match("Total: 100.00"));
        assert!(!EXPLICIT_ZERO.is_match("Total: 1,000.50"));
        assert!(!EXPLICIT_ZERO.is_match("Total 0.50"));
    }
}
