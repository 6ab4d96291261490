//! Invoice date recovery.

use chrono::NaiveDate;

use super::patterns::{LABELLED_DATE, LABELLED_NAMED_DATE, ORPHANED_DATE};
use super::{ExtractionMatch, FieldExtractor};
use crate::normalize::parse_date;

/// Date extractor.
///
/// Patterns are tried in order: labelled numeric or abbreviated dates,
/// labelled month-first dates, then any date-looking token. Only matches
/// that parse to a calendar date count.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let ordered = [
            (&*LABELLED_DATE, 0.9),
            (&*LABELLED_NAMED_DATE, 0.85),
            (&*ORPHANED_DATE, 0.5),
        ];

        ordered
            .into_iter()
            .flat_map(|(re, confidence)| re.captures_iter(text).map(move |caps| (caps, confidence)))
            .filter_map(|(caps, confidence)| {
                let raw = caps.get(1)?;
                let date = parse_date(raw.as_str())?;
                Some(ExtractionMatch::from_capture(date, confidence, raw))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_labelled_month_first() {
        let found = DateExtractor::new()
            .extract("Grand Total: $250.00\nInvoice Date: Jan 5 2024")
            .unwrap();
        assert_eq!(found.value, ymd(2024, 1, 5));
        assert_eq!(found.source, "Jan 5 2024");
    }

    #[test]
    fn test_labelled_beats_orphaned() {
        let text = "Printed 01/02/2023\nDated: 12.09.2025";
        let found = DateExtractor::new().extract(text).unwrap();
        assert_eq!(found.value, ymd(2025, 9, 12));
        assert_eq!(found.confidence, 0.9);
    }

    #[test]
    fn test_orphaned_date() {
        let found = DateExtractor::new().extract("Thanks for shopping 12-Sep-2025").unwrap();
        assert_eq!(found.value, ymd(2025, 9, 12));
    }

    #[test]
    fn test_impossible_dates_are_skipped() {
        assert!(DateExtractor::new().extract("Date: 45/45/2024").is_none());
    }
}
