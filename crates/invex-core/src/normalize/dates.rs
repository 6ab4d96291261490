//! Fuzzy, day-first date normalization.

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // 12-Sep-2025, 5th January 2024, 12 Sept, 25
    static ref DAY_NAMED_MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s\-/.,]*([a-z]{3,9})\.?[\s\-/.,]*(\d{4}|\d{2})\b"
    ).unwrap();

    // Jan 5 2024, January 5th, 2024
    static ref NAMED_MONTH_DAY_YEAR: Regex = Regex::new(
        r"(?i)\b([a-z]{3,9})\.?[\s\-/.,]*(\d{1,2})(?:st|nd|rd|th)?,?[\s\-/.,]+(\d{4}|\d{2})\b"
    ).unwrap();

    // 2024-01-15
    static ref YEAR_MONTH_DAY: Regex = Regex::new(
        r"\b(\d{4})[\-/.](\d{1,2})[\-/.](\d{1,2})\b"
    ).unwrap();

    // 15/01/2024, 15.01.24
    static ref DAY_MONTH_YEAR: Regex = Regex::new(
        r"\b(\d{1,2})[\-/.\s](\d{1,2})[\-/.\s](\d{4}|\d{2})\b"
    ).unwrap();
}

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Canonical output format, e.g. `12-Sep-2025`.
pub const CANONICAL_FORMAT: &str = "%d-%b-%Y";

/// Month number for an English month name or abbreviation of at least
/// three letters.
fn month_from_name(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    if name.len() < 3 {
        return None;
    }
    if name == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|full| full.starts_with(&name))
        .map(|i| i as u32 + 1)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(match raw.len() {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

fn build(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(expand_year(year)?, month, day)
}

/// Find the first date anywhere in `text`, reading numeric dates day-first.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    for caps in DAY_NAMED_MONTH_YEAR.captures_iter(text) {
        if let Some(date) = month_from_name(&caps[2]).and_then(|m| build(&caps[3], m, &caps[1])) {
            return Some(date);
        }
    }

    for caps in NAMED_MONTH_DAY_YEAR.captures_iter(text) {
        if let Some(date) = month_from_name(&caps[1]).and_then(|m| build(&caps[3], m, &caps[2])) {
            return Some(date);
        }
    }

    for caps in YEAR_MONTH_DAY.captures_iter(text) {
        let month = caps[2].parse().ok();
        if let Some(date) = month.and_then(|m| build(&caps[1], m, &caps[3])) {
            return Some(date);
        }
    }

    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        let (Ok(first), Ok(second)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        // Day-first unless that is impossible and the swap is not.
        let (day, month) = if second > 12 && first <= 12 {
            (second, first)
        } else {
            (first, second)
        };
        if let Some(date) = build(&caps[3], month, &day.to_string()) {
            return Some(date);
        }
    }

    None
}

/// Normalize a date string to `DD-Mon-YYYY`.
///
/// Input that contains no recognizable date is returned unchanged.
pub fn normalize_date(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    match parse_date(raw) {
        Some(date) => date.format(CANONICAL_FORMAT).to_string(),
        None => raw.to_string(),
    }
}

/// Year and full month name of a date string, for grouping reports.
pub fn year_month(raw: &str) -> Option<(i32, String)> {
    let date = parse_date(raw)?;
    Some((date.year(), date.format("%B").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_named_month() {
        assert_eq!(normalize_date("Jan 5 2024"), "05-Jan-2024");
        assert_eq!(normalize_date("January 5th, 2024"), "05-Jan-2024");
        assert_eq!(normalize_date("12 Sept 2025"), "12-Sep-2025");
        assert_eq!(normalize_date("Dated: 3-mar-24"), "03-Mar-2024");
    }

    #[test]
    fn test_normalize_numeric_is_day_first() {
        assert_eq!(normalize_date("05/01/2024"), "05-Jan-2024");
        assert_eq!(normalize_date("15.01.24"), "15-Jan-2024");
        assert_eq!(normalize_date("01/25/2024"), "25-Jan-2024");
        assert_eq!(normalize_date("2024-01-15"), "15-Jan-2024");
    }

    #[test]
    fn test_unparsable_returned_unchanged() {
        assert_eq!(normalize_date("N/A"), "N/A");
        assert_eq!(normalize_date("Total 2024"), "Total 2024");
        assert_eq!(normalize_date("31/31/2024"), "31/31/2024");
        assert_eq!(normalize_date("   "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in [
            "Jan 5 2024",
            "05/01/2024",
            "2023-12-31",
            "5th January 2024",
            "not a date",
            "",
            "12-Sep-2025",
            "29.02.2024",
        ] {
            let once = normalize_date(input);
            assert_eq!(normalize_date(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_year_month() {
        assert_eq!(year_month("12-Sep-2025"), Some((2025, "September".to_string())));
        assert_eq!(year_month("nothing"), None);
    }
}
