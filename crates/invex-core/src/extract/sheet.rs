//! Tabular formats: spreadsheets via calamine, CSV via the csv crate.
//!
//! Each row becomes one line with its non-empty cells joined by `" | "`.

use std::io::Cursor;

use calamine::{Reader, open_workbook_auto_from_rs};
use tracing::debug;

use crate::error::ExtractionError;

const CELL_SEPARATOR: &str = " | ";

fn join_cells<I, S>(cells: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cells: Vec<String> = cells
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    (!cells.is_empty()).then(|| cells.join(CELL_SEPARATOR))
}

/// Every row of every sheet, in workbook order.
pub fn spreadsheet_lines(data: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
        .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;

    let mut lines = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractionError::Spreadsheet(format!("sheet {}: {}", name, e)))?;
        let before = lines.len();
        lines.extend(range.rows().filter_map(|row| join_cells(row.iter().map(|cell| cell.to_string()))));
        debug!(sheet = %name, rows = lines.len() - before, "read worksheet");
    }
    Ok(lines)
}

/// Every CSV record as one line. Rows may have differing widths.
pub fn csv_lines(data: &[u8]) -> Result<Vec<String>, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractionError::Csv(e.to_string()))?;
        if let Some(line) = join_cells(record.iter()) {
            lines.push(line);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_rows_become_lines() {
        let data = b"Item,Qty,Amount\nWidget,2,10.00\n,,\nGrand Total,,\"1,250.00\"\n";
        assert_eq!(
            csv_lines(data).unwrap(),
            vec![
                "Item | Qty | Amount".to_string(),
                "Widget | 2 | 10.00".to_string(),
                "Grand Total | 1,250.00".to_string(),
            ]
        );
    }

    #[test]
    fn test_csv_tolerates_ragged_rows() {
        let data = b"Vendor,Acme Co\nTotal\n";
        assert_eq!(csv_lines(data).unwrap(), vec!["Vendor | Acme Co", "Total"]);
    }

    #[test]
    fn test_invalid_workbook_is_reported() {
        let err = spreadsheet_lines(b"not a workbook").unwrap_err();
        assert!(matches!(err, ExtractionError::Spreadsheet(_)));
    }
}
