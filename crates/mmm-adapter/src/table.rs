//! Rectangular CSV table with typed column access.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::AdapterError;

/// A header row plus string cells, one row per observation.
///
/// Every row has exactly as many cells as the header. Cells are stored
/// trimmed and parsed on demand, so non-numeric columns (dates, geo labels)
/// and numeric columns share one representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TimeSeriesTable {
    /// Builds a table from headers and rows, rejecting ragged rows.
    pub fn new(
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, AdapterError> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(AdapterError::shape(format!(
                "row {} has {} cells, header has {}",
                index + 1,
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column with this exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Raw cell text of a column.
    pub fn text_column(&self, name: &str) -> Result<Vec<&str>, AdapterError> {
        let index = self.require(name)?;
        Ok(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Parses every cell of a column as a finite `f64`.
    ///
    /// Blank and non-numeric cells are errors naming the column and the
    /// 1-based data row.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, AdapterError> {
        let index = self.require(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let cell = &row[index];
                parse_number(cell)
                    .ok_or_else(|| AdapterError::invalid_value(name, i + 1, cell))
            })
            .collect()
    }

    /// Parses a column leniently: unusable cells become `None`.
    pub fn numeric_column_lenient(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| parse_number(&row[index])).collect())
    }

    fn require(&self, name: &str) -> Result<usize, AdapterError> {
        self.column_index(name).ok_or_else(|| {
            AdapterError::shape(format!("column '{name}' is not in the table"))
        })
    }
}

/// Comma-grouped thousands: `1,234` or `-12,345,678.50`.
static THOUSANDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid regex")
});

/// Parses a numeric cell, tolerating thousands separators.
///
/// Any other comma (`1,5`, `12,34`) makes the cell unparseable.
fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    let value = match cell.parse::<f64>() {
        Ok(v) => v,
        Err(_) if THOUSANDS.is_match(cell) => {
            cell.replace(',', "").parse::<f64>().ok()?
        }
        Err(_) => return None,
    };
    value.is_finite().then_some(value)
}

/// Reads a CSV table with a header row.
pub fn read_table(reader: impl Read) -> Result<TimeSeriesTable, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> =
        reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(AdapterError::shape("input table has no header row"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Trailing blank lines from spreadsheet exports.
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    let table = TimeSeriesTable::new(headers, rows)?;
    debug!(
        rows = table.len(),
        columns = table.headers().len(),
        "table.read"
    );
    Ok(table)
}

/// Opens and reads a CSV file.
pub fn load_table(path: &Path) -> Result<TimeSeriesTable, AdapterError> {
    let file = File::open(path)?;
    read_table(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_access() {
        let csv = "date,sales,tv_spend\n2024-01-01,100,10\n2024-01-08, 120 ,1,500\n";
        // Quoted thousands separator is a single cell.
        let csv = csv.replace("1,500", "\"1,500\"");
        let table = read_table(csv.as_bytes()).unwrap();

        assert_eq!(table.headers(), ["date", "sales", "tv_spend"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("sales").unwrap(), [100.0, 120.0]);
        assert_eq!(table.numeric_column("tv_spend").unwrap(), [10.0, 1500.0]);
        assert_eq!(
            table.text_column("date").unwrap(),
            ["2024-01-01", "2024-01-08"]
        );
    }

    #[test]
    fn test_ragged_row_is_shape_error() {
        let err = read_table("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(err.is_shape(), "{err}");
    }

    #[test]
    fn test_blank_numeric_cell_names_row() {
        let table = read_table("a,b\n1,2\n,4\n".as_bytes()).unwrap();
        let err = table.numeric_column("a").unwrap_err();
        assert!(err.is_invalid_value());
        assert!(err.to_string().contains("row 2"), "{err}");
    }

    #[test]
    fn test_only_grouping_commas_are_stripped() {
        let table = read_table(
            "a\n\"1,5\"\n\"12,34\"\n\"-12,345,678.50\"\n\"1,000\"\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(
            table.numeric_column_lenient("a"),
            Some(vec![None, None, Some(-12_345_678.5), Some(1_000.0)])
        );
        let err = table.numeric_column("a").unwrap_err();
        assert!(err.is_invalid_value());
        assert!(err.to_string().contains("'1,5'"), "{err}");
    }

    #[test]
    fn test_nan_is_rejected() {
        let table = read_table("a\nNaN\n".as_bytes()).unwrap();
        assert!(table.numeric_column("a").is_err());
        assert_eq!(table.numeric_column_lenient("a"), Some(vec![None]));
    }

    #[test]
    fn test_trailing_blank_lines_skipped() {
        let table = read_table("a,b\n1,2\n,\n".as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io() {
        let err = load_table(Path::new("/no/such/input.csv")).unwrap_err();
        assert!(err.is_io());
    }
}
