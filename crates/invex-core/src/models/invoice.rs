//! Structured invoice records and per-stage extraction results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::normalize::{clean_amount_value, clean_invoice_number, normalize_date};

/// Placeholder some models emit for fields they could not read.
pub const UNKNOWN: &str = "Unknown";

/// Category used when nothing better is known.
pub const DEFAULT_DESCRIPTION: &str = "General Retail";

/// Record keys a model is asked to fill.
pub const FIELD_KEYS: [&str; 6] = [
    "invoice_number",
    "invoice_date",
    "gst_number",
    "vendor_name",
    "total_amount",
    "description",
];

/// Fields whose absence triggers escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalField {
    InvoiceDate,
    TotalAmount,
    VendorName,
}

impl CriticalField {
    pub const ALL: [CriticalField; 3] = [
        CriticalField::InvoiceDate,
        CriticalField::TotalAmount,
        CriticalField::VendorName,
    ];

    /// JSON key of the field.
    pub fn key(&self) -> &'static str {
        match self {
            CriticalField::InvoiceDate => "invoice_date",
            CriticalField::TotalAmount => "total_amount",
            CriticalField::VendorName => "vendor_name",
        }
    }
}

impl fmt::Display for CriticalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// True for values that carry no information: blank, `None` or `null`.
pub fn is_missing_text(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("null")
}

/// A finalized invoice record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Invoice number with label prefixes stripped.
    pub invoice_number: String,

    /// Canonical `DD-Mon-YYYY` date, or empty.
    pub invoice_date: String,

    /// 15-character GST identification number.
    pub gst_number: String,

    pub vendor_name: String,

    /// Grand total; zero means missing.
    pub total_amount: Decimal,

    /// Short spending category.
    pub description: String,

    /// Text the record was extracted from.
    pub raw_text: String,

    /// Which stage last contributed a field.
    pub extraction_method: String,

    /// Owning tenant.
    pub tenant_id: String,

    /// Source file identifier (dedup key).
    pub file_id: String,

    /// Source file display name.
    pub file_name: String,
}

impl InvoiceRecord {
    /// Empty record bound to a source file.
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            invoice_number: String::new(),
            invoice_date: String::new(),
            gst_number: String::new(),
            vendor_name: String::new(),
            total_amount: Decimal::ZERO,
            description: String::new(),
            raw_text: String::new(),
            extraction_method: String::new(),
            tenant_id: String::new(),
            file_id: file_id.into(),
            file_name: file_name.into(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    /// Critical fields that are still empty, `None`-like or zero.
    pub fn missing_critical(&self) -> Vec<CriticalField> {
        CriticalField::ALL
            .into_iter()
            .filter(|field| match field {
                CriticalField::InvoiceDate => is_missing_text(&self.invoice_date),
                CriticalField::VendorName => is_missing_text(&self.vendor_name),
                CriticalField::TotalAmount => self.total_amount <= Decimal::ZERO,
            })
            .collect()
    }

    /// Whether the named field currently holds a value.
    pub fn has_value(&self, key: &str) -> bool {
        match key {
            "invoice_number" => !is_missing_text(&self.invoice_number),
            "invoice_date" => !is_missing_text(&self.invoice_date),
            "gst_number" => !is_missing_text(&self.gst_number),
            "vendor_name" => !is_missing_text(&self.vendor_name),
            "total_amount" => self.total_amount > Decimal::ZERO,
            "description" => !is_missing_text(&self.description),
            _ => false,
        }
    }

    /// Merge one field from a model or regex result.
    ///
    /// Values are normalized on the way in. Missing values are ignored; an
    /// existing value is replaced only when `overwrite` is set. Returns true
    /// when the record changed.
    pub fn merge_field(&mut self, key: &str, value: &Value, overwrite: bool) -> bool {
        if !overwrite && self.has_value(key) {
            return false;
        }

        if key == "total_amount" {
            let amount = clean_amount_value(value);
            if amount <= Decimal::ZERO {
                return false;
            }
            self.total_amount = amount;
            return true;
        }

        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return false,
        };
        if is_missing_text(&text) {
            return false;
        }

        let slot = match key {
            "invoice_number" => {
                let cleaned = clean_invoice_number(&text);
                if cleaned.is_empty() {
                    return false;
                }
                self.invoice_number = cleaned;
                return true;
            }
            "invoice_date" => {
                self.invoice_date = normalize_date(&text);
                return true;
            }
            "gst_number" => &mut self.gst_number,
            "vendor_name" => &mut self.vendor_name,
            "description" => &mut self.description,
            _ => return false,
        };
        *slot = text;
        true
    }

    /// Merge every known key of a JSON object; returns the keys that changed.
    pub fn merge_object(&mut self, object: &Map<String, Value>, overwrite: bool) -> Vec<String> {
        FIELD_KEYS
            .iter()
            .filter(|key| {
                object
                    .get(**key)
                    .is_some_and(|value| self.merge_field(key, value, overwrite))
            })
            .map(|key| key.to_string())
            .collect()
    }

    /// Field values as a JSON object, used as context for follow-up prompts.
    pub fn fields_json(&self) -> Value {
        let total = if self.total_amount > Decimal::ZERO {
            self.total_amount.to_string()
        } else {
            String::new()
        };
        serde_json::json!({
            "invoice_number": self.invoice_number,
            "invoice_date": self.invoice_date,
            "gst_number": self.gst_number,
            "vendor_name": self.vendor_name,
            "total_amount": total,
            "description": self.description,
        })
    }
}

/// One escalation step of the field extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    EmptyText,
    Primary,
    DeepRetry,
    RegexFallback,
    Rescue,
}

impl ExtractionStage {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractionStage::EmptyText => "empty_text",
            ExtractionStage::Primary => "primary",
            ExtractionStage::DeepRetry => "deep_retry",
            ExtractionStage::RegexFallback => "regex_fallback",
            ExtractionStage::Rescue => "rescue",
        }
    }
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub stage: ExtractionStage,
    /// Provider that answered, for model-backed stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Fields this stage filled.
    pub produced: Vec<String>,
    /// Critical fields still missing after this stage.
    pub missing: Vec<CriticalField>,
    /// Why the stage failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final record plus the trail that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub record: InvoiceRecord,
    pub attempts: Vec<ExtractionAttempt>,
    /// Number of language-model calls issued.
    pub model_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_missing_critical() {
        let mut record = InvoiceRecord::new("f1", "a.pdf");
        assert_eq!(record.missing_critical(), CriticalField::ALL.to_vec());

        record.vendor_name = "None".into();
        record.invoice_date = "05-Jan-2024".into();
        record.total_amount = Decimal::from(10);
        assert_eq!(record.missing_critical(), vec![CriticalField::VendorName]);
    }

    #[test]
    fn test_merge_normalizes_values() {
        let mut record = InvoiceRecord::new("f1", "a.pdf");
        let object = json!({
            "invoice_number": "Invoice No: INV-7",
            "invoice_date": "Jan 5 2024",
            "vendor_name": "Acme Co",
            "total_amount": "₹1,234.50",
            "gst_number": "",
            "raw_text": "ignored",
        });

        let produced = record.merge_object(object.as_object().unwrap(), true);

        assert_eq!(produced, vec!["invoice_number", "invoice_date", "vendor_name", "total_amount"]);
        assert_eq!(record.invoice_number, "INV-7");
        assert_eq!(record.invoice_date, "05-Jan-2024");
        assert_eq!(record.total_amount, Decimal::from_str("1234.50").unwrap());
        assert_eq!(record.gst_number, "");
    }

    #[test]
    fn test_merge_without_overwrite_keeps_existing() {
        let mut record = InvoiceRecord::new("f1", "a.pdf");
        record.vendor_name = "Acme Co".into();

        let object = json!({"vendor_name": "Other Ltd", "invoice_date": null, "total_amount": 99});
        let produced = record.merge_object(object.as_object().unwrap(), false);

        assert_eq!(produced, vec!["total_amount"]);
        assert_eq!(record.vendor_name, "Acme Co");
        assert_eq!(record.total_amount, Decimal::from(99));
    }
}
