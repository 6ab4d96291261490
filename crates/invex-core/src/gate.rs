//! Acceptance rule and routing for finished records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::config::{AcceptancePolicy, PipelineConfig};
use crate::models::invoice::{InvoiceRecord, UNKNOWN, is_missing_text};

/// Outcome of the acceptance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

fn has_signal(value: &str) -> bool {
    !is_missing_text(value) && !value.trim().eq_ignore_ascii_case(UNKNOWN)
}

/// Decide whether a record is worth persisting.
pub fn accept(record: &InvoiceRecord, policy: AcceptancePolicy) -> Verdict {
    let has_amount = record.total_amount > Decimal::ZERO;

    match policy {
        AcceptancePolicy::AmountRequired if has_amount => Verdict::Accepted,
        AcceptancePolicy::AmountRequired => Verdict::Rejected("total amount is missing or zero".into()),
        AcceptancePolicy::AnySignal
            if has_amount || has_signal(&record.vendor_name) || has_signal(&record.invoice_date) =>
        {
            Verdict::Accepted
        }
        AcceptancePolicy::AnySignal => Verdict::Rejected("no amount, vendor or date found".into()),
    }
}

/// Where a processed file belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Valid,
    Invalid,
}

impl Route {
    /// Destination folder name for this route.
    pub fn destination<'a>(&self, config: &'a PipelineConfig) -> &'a str {
        match self {
            Route::Valid => &config.valid_destination,
            Route::Invalid => &config.invalid_destination,
        }
    }
}

impl From<&Verdict> for Route {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Accepted => Route::Valid,
            Verdict::Rejected(_) => Route::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn record() -> InvoiceRecord {
        InvoiceRecord::new("f1", "a.pdf")
    }

    #[test]
    fn test_amount_and_vendor_without_date_is_accepted() {
        let mut r = record();
        r.total_amount = crate::normalize::clean_amount("5,000.00");
        r.vendor_name = "Acme Co".into();
        assert_eq!(accept(&r, AcceptancePolicy::AnySignal), Verdict::Accepted);
        assert_eq!(accept(&r, AcceptancePolicy::AmountRequired), Verdict::Accepted);
    }

    #[test]
    fn test_no_signal_is_rejected() {
        let mut r = record();
        r.vendor_name = "Unknown".into();
        r.invoice_date = "null".into();
        r.invoice_number = "INV-1".into();
        assert!(!accept(&r, AcceptancePolicy::AnySignal).is_accepted());
    }

    #[test]
    fn test_vendor_only_depends_on_policy() {
        let mut r = record();
        r.vendor_name = "Corner Store".into();
        assert!(accept(&r, AcceptancePolicy::AnySignal).is_accepted());
        assert_eq!(
            accept(&r, AcceptancePolicy::AmountRequired),
            Verdict::Rejected("total amount is missing or zero".into())
        );
    }

    #[test]
    fn test_date_only_is_a_signal() {
        let mut r = record();
        r.invoice_date = "05-Jan-2024".into();
        assert!(accept(&r, AcceptancePolicy::AnySignal).is_accepted());

        r.total_amount = Decimal::from_str("0.00").unwrap();
        r.invoice_date = "Unknown".into();
        assert!(!accept(&r, AcceptancePolicy::AnySignal).is_accepted());
    }

    #[test]
    fn test_routes() {
        let config = PipelineConfig::default();
        assert_eq!(Route::from(&Verdict::Accepted).destination(&config), "scanned_docs");
        assert_eq!(Route::from(&Verdict::Rejected("x".into())).destination(&config), "invalid_docs");
    }
}
