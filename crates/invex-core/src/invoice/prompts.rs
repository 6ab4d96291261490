//! Prompt text for the model-backed extraction stages.

use serde_json::Value;

use crate::models::invoice::CriticalField;

/// System instruction shared by every extraction call.
pub const SYSTEM_PROMPT: &str = "You are a precise financial invoice assistant. Return only valid JSON.";

const FIELD_RULES: &str = r#"Return ONE JSON object with exactly these keys:
- invoice_number: the invoice number. If absent, use alternatives such as "Challan Number", "Bill Number", "Invoice #", "Invoice No" or "Do No".
- invoice_date: the invoice date formatted as "MMM DD YYYY", e.g. "Dec 20 2012".
- gst_number: the GST number if present, else "".
- vendor_name: the seller's name if found, else "".
- total_amount: the grand total including all taxes and charges, digits only.
- description: a 2-3 word category inferred from the items.

Description rules:
- bread, snacks, beverages -> "Groceries"
- office supplies -> "Office Supplies"
- hardware tools -> "Hardware & Electrical"
- beauty, skin or hair products -> "Personal Care"
- clothing -> "Fashion/Retail"
- restaurant meals -> "Food & Dining"
- phones, laptops -> "Electronics"
- otherwise "General Retail"

Rules:
- If a field is missing, return "".
- Any currency may appear: USD ($), INR (₹), EUR (€), MYR (RM).
- Totals may be labelled "Grand Total", "Total Fare", "Total Invoice Value", "Amount Payable" or "Balance Due". When several subtotals are present, choose the highest value.
- Dates may be labelled "Invoice Date", "Date of Journey", "Boarding Date" or "Dated".
- Labels and values may be far apart or split across lines; connect them."#;

fn field_list(missing: &[CriticalField]) -> String {
    let keys: Vec<&str> = missing.iter().map(|f| f.key()).collect();
    serde_json::to_string(&keys).unwrap_or_default()
}

/// First full-text extraction request.
pub fn primary_prompt(text: &str) -> String {
    format!("{}\n\nInvoice text:\n{}", FIELD_RULES, text)
}

/// Narrow request for the critical fields the first pass missed.
pub fn deep_retry_prompt(text: &str, partial: &Value, missing: &[CriticalField]) -> String {
    format!(
        "A previous pass extracted this partial invoice record:\n{}\n\n\
         These fields are still missing: {}\n\
         Search the text thoroughly for them, including values far from their labels.\n\
         Return ONE JSON object containing only those keys; use \"\" when a value truly does not exist.\n\n\
         Invoice text:\n{}",
        partial, field_list(missing), text
    )
}

/// Last-chance request after every other stage ran.
pub fn rescue_prompt(text: &str, missing: &[CriticalField]) -> String {
    format!(
        "Find only these invoice fields: {}\n\
         total_amount is the final amount paid, digits only. invoice_date uses \"MMM DD YYYY\". \
         vendor_name is the business that issued the document.\n\
         Return ONE JSON object with only those keys.\n\n\
         Text:\n{}",
        field_list(missing),
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_retry_names_missing_fields() {
        let prompt = deep_retry_prompt(
            "Acme\nTotal 5",
            &json!({"vendor_name": "Acme"}),
            &[CriticalField::InvoiceDate],
        );
        assert!(prompt.contains(r#"These fields are still missing: ["invoice_date"]"#));
        assert!(prompt.contains(r#""vendor_name":"Acme""#));
        assert!(prompt.ends_with("Acme\nTotal 5"));
    }

    #[test]
    fn test_rescue_lists_fields() {
        let prompt = rescue_prompt("x", &[CriticalField::TotalAmount, CriticalField::VendorName]);
        assert!(prompt.starts_with(r#"Find only these invoice fields: ["total_amount","vendor_name"]"#));
    }

    #[test]
    fn test_primary_embeds_text() {
        let prompt = primary_prompt("Grand Total 10");
        assert!(prompt.contains("invoice_number"));
        assert!(prompt.ends_with("Invoice text:\nGrand Total 10"));
    }
}
