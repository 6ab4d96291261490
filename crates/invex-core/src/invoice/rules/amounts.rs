//! Grand total recovery.

use rust_decimal::Decimal;

use super::patterns::{TOTAL_DUE, TOTAL_LINE, TOTAL_VALUE};
use super::{ExtractionMatch, FieldExtractor};
use crate::normalize::clean_amount;

/// Total amount extractor.
///
/// Labelled totals are collected across the whole text and the largest one
/// wins, so subtotals and tax lines lose to the grand total.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Any "total ... : N.NN" line, used only when no labelled total exists.
    fn total_line(&self, text: &str) -> Option<ExtractionMatch<Decimal>> {
        let caps = TOTAL_LINE.captures(text)?;
        let amount = caps.get(1)?;
        let value = clean_amount(amount.as_str());
        (value > Decimal::ZERO).then(|| ExtractionMatch::from_capture(value, 0.6, amount))
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text)
            .into_iter()
            .max_by(|a, b| a.value.cmp(&b.value))
            .or_else(|| self.total_line(text))
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        [&*TOTAL_VALUE, &*TOTAL_DUE]
            .into_iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|caps| {
                let amount = caps.get(1)?;
                let value = clean_amount(amount.as_str());
                (value > Decimal::ZERO).then(|| ExtractionMatch::from_capture(value, 0.9, amount))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_picks_largest_labelled_total() {
        let text = "Subtotal: 900.00\nTotal Amount: 1,000.00\nGST 18%: 180.00\nGrand Total: ₹1,180.00";
        let found = AmountExtractor::new().extract(text).unwrap();
        assert_eq!(found.value, dec("1180.00"));
        assert_eq!(found.source, "1,180.00");
    }

    #[test]
    fn test_travel_totals() {
        let text = "Base fare 1200\nTotal Fare (all inclusive): 1,545.60";
        assert_eq!(AmountExtractor::new().extract(text).unwrap().value, dec("1545.60"));
    }

    #[test]
    fn test_total_line_fallback() {
        let text = "Items 3\nNet total payable ₹ 75.50";
        assert_eq!(AmountExtractor::new().extract(text).unwrap().value, dec("75.50"));
    }

    #[test]
    fn test_zero_totals_ignored() {
        assert!(AmountExtractor::new().extract("Grand Total: 0.00").is_none());
        assert!(AmountExtractor::new().extract("no figures here").is_none());
    }
}
