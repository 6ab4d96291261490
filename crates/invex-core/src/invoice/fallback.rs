//! Regex-only field recovery.

use serde_json::{Map, Value};

use super::rules::{AmountExtractor, DateExtractor, FieldExtractor, GstExtractor, InvoiceNumberExtractor};
use crate::models::invoice::DEFAULT_DESCRIPTION;
use crate::normalize::CANONICAL_FORMAT;

/// Recover whatever fields the deterministic patterns can find.
///
/// The result has the same shape as a model response so it merges through
/// the same path. The description is always the generic category.
pub fn regex_parse(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();

    if let Some(number) = InvoiceNumberExtractor::new().extract(text) {
        fields.insert("invoice_number".into(), Value::String(number.value));
    }
    if let Some(date) = DateExtractor::new().extract(text) {
        fields.insert(
            "invoice_date".into(),
            Value::String(date.value.format(CANONICAL_FORMAT).to_string()),
        );
    }
    if let Some(gst) = GstExtractor::new().extract(text) {
        fields.insert("gst_number".into(), Value::String(gst.value));
    }
    if let Some(amount) = AmountExtractor::new().extract(text) {
        fields.insert("total_amount".into(), Value::String(amount.value.to_string()));
    }
    fields.insert("description".into(), Value::String(DEFAULT_DESCRIPTION.into()));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_total_and_named_date() {
        let fields = regex_parse("Grand Total: $250.00\nInvoice Date: Jan 5 2024");
        assert_eq!(
            Value::Object(fields),
            json!({
                "invoice_date": "05-Jan-2024",
                "total_amount": "250.00",
                "description": "General Retail",
            })
        );
    }

    #[test]
    fn test_full_retail_receipt() {
        let text = "SHOP RITE\nGSTIN: 29ABCDE1234F1Z5\nBill No: 4471\nDate: 03/11/2024\nTotal Amount: 450.00\nGrand Total: Rs. 472.50";
        let fields = regex_parse(text);
        assert_eq!(fields["invoice_number"], "4471");
        assert_eq!(fields["invoice_date"], "03-Nov-2024");
        assert_eq!(fields["gst_number"], "29ABCDE1234F1Z5");
        assert_eq!(fields["total_amount"], "472.50");
    }

    #[test]
    fn test_nothing_found() {
        let fields = regex_parse("hello world");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["description"], DEFAULT_DESCRIPTION);
    }
}
