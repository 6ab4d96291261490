//! Amount cleaning.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Strip currency symbols, thousands separators and labels from an amount.
///
/// Returns zero for empty or non-numeric input. The result is never negative.
pub fn clean_amount(raw: &str) -> Decimal {
    let mut cleaned = String::with_capacity(raw.len());
    let mut seen_digit = false;
    let mut seen_letter = false;

    for c in raw.chars() {
        if c.is_ascii_digit() {
            seen_digit = true;
            cleaned.push(c);
        } else if c == '.' {
            // The dot of an abbreviation such as "Rs." is not a decimal point.
            if !seen_digit && seen_letter {
                continue;
            }
            cleaned.push(c);
        } else if c.is_alphabetic() {
            seen_letter = true;
        }
    }

    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(cleaned).unwrap_or(Decimal::ZERO)
}

/// [`clean_amount`] over a JSON value; numbers are taken as-is.
pub fn clean_amount_value(value: &Value) -> Decimal {
    match value {
        Value::String(s) => clean_amount(s),
        Value::Number(n) => clean_amount(&n.to_string()),
        _ => Decimal::ZERO,
    }
}

/// An amount is a usable invoice total when it cleans to a positive value.
pub fn is_valid_invoice_amount(raw: &str) -> bool {
    clean_amount(raw) > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_clean_amount_strips_symbols() {
        assert_eq!(clean_amount("₹1,234.50"), dec("1234.50"));
        assert_eq!(clean_amount("$250.00"), dec("250"));
        assert_eq!(clean_amount("RM 12"), dec("12"));
        assert_eq!(clean_amount("Rs. 500"), dec("500"));
        assert_eq!(clean_amount("1,00,000.75 INR"), dec("100000.75"));
        assert_eq!(clean_amount("250."), dec("250"));
    }

    #[test]
    fn test_clean_amount_defaults_to_zero() {
        assert_eq!(clean_amount(""), Decimal::ZERO);
        assert_eq!(clean_amount("N/A"), Decimal::ZERO);
        assert_eq!(clean_amount("1.234.50"), Decimal::ZERO);
    }

    #[test]
    fn test_clean_amount_is_non_negative() {
        assert_eq!(clean_amount("-45.10"), dec("45.10"));
        assert_eq!(clean_amount_value(&json!(-3)), dec("3"));
    }

    #[test]
    fn test_clean_amount_value() {
        assert_eq!(clean_amount_value(&json!(1234.5)), dec("1234.5"));
        assert_eq!(clean_amount_value(&json!("5,000.00")), dec("5000"));
        assert_eq!(clean_amount_value(&Value::Null), Decimal::ZERO);
    }

    #[test]
    fn test_is_valid_invoice_amount() {
        assert!(is_valid_invoice_amount("₹0.01"));
        assert!(!is_valid_invoice_amount("0.00"));
        assert!(!is_valid_invoice_amount("zero"));
    }
}
