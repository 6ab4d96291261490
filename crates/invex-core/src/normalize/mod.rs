//! Canonicalization of dates, amounts and invoice numbers.
//!
//! Every function here is total: bad input degrades to an empty, zero or
//! unchanged value instead of an error.

mod amounts;
mod dates;
mod numbers;

pub use amounts::{clean_amount, clean_amount_value, is_valid_invoice_amount};
pub use dates::{CANONICAL_FORMAT, normalize_date, parse_date, year_month};
pub use numbers::clean_invoice_number;
