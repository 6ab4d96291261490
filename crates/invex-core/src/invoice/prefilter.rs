//! Cheap "does this look like it has a total" heuristic.

use super::rules::patterns::{EXPLICIT_ZERO, TOTAL_HINT};

/// True when any line mentions a total and is not an explicit zero amount.
///
/// Advisory only: the pipeline logs the result and skips the document only
/// when configured to.
pub fn has_total_candidate<S: AsRef<str>>(lines: &[S]) -> bool {
    lines.iter().map(AsRef::as_ref).any(is_total_line)
}

fn is_total_line(line: &str) -> bool {
    TOTAL_HINT.is_match(line) && !EXPLICIT_ZERO.is_match(line)
}
