//! Domain models for the grade merge pipeline.
//!
//! - [`GradeValue`] - Tagged cell value (number or text)
//! - [`Cell`] - Optional grade value, `None` being a blank field
//! - [`Table`] - Headers plus ragged rows, as read from a CSV export
//! - [`ProviderTable`] - Provider report with its "Point Possible" metadata row
//! - [`BlankPolicy`] - What to write when a provider score is missing
//! - [`MergeSummary`] - Counters reported after a merge

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gradebook identity column holding the student email.
pub const GRADEBOOK_EMAIL: &str = "Email";
/// Gradebook last name column.
pub const GRADEBOOK_LAST_NAME: &str = "Last Name";
/// Gradebook first name column.
pub const GRADEBOOK_FIRST_NAME: &str = "First Name";

/// Provider identity column holding the student email.
pub const PROVIDER_EMAIL: &str = "EMAIL";
/// Provider student name column.
pub const PROVIDER_NAME: &str = "NAME";
/// `NAME` value of the provider's max-points metadata row.
pub const POINT_POSSIBLE: &str = "Point Possible";

// =============================================================================
// Cell values
// =============================================================================

/// A single grade cell value.
///
/// Merge writes produce `Number` when the provider text parses as a float
/// and `Text` otherwise. Loaded cells are always `Text` holding the field
/// verbatim, so untouched cells serialize back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GradeValue {
    Number(f64),
    Text(String),
}

impl GradeValue {
    /// Coerce a provider value: float if it parses, otherwise the trimmed text.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) => GradeValue::Number(n),
            Err(_) => GradeValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            GradeValue::Number(n) => Some(*n),
            GradeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            GradeValue::Text(s) => Some(s),
            GradeValue::Number(_) => None,
        }
    }
}

impl fmt::Display for GradeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeValue::Number(n) => write!(f, "{}", n),
            GradeValue::Text(s) => f.write_str(s),
        }
    }
}

/// A table cell. `None` is a null (empty) field.
pub type Cell = Option<GradeValue>;

/// Build a cell from a raw CSV field, keeping the text verbatim.
pub fn cell_from_field(field: &str) -> Cell {
    if field.is_empty() {
        None
    } else {
        Some(GradeValue::Text(field.to_string()))
    }
}

/// Render a cell as the CSV field it should be written as.
pub fn cell_to_field(cell: &Cell) -> String {
    cell.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// True when a cell is null or its text is empty after trimming.
pub fn is_blank(cell: &Cell) -> bool {
    match cell {
        None => true,
        Some(GradeValue::Number(_)) => false,
        Some(GradeValue::Text(s)) => {
            s.trim().is_empty()
        }
    }
}

// =============================================================================
// Tables
// =============================================================================

/// A decoded CSV export.
///
/// Rows keep the length they had in the source file, so a row may hold fewer
/// cells than there are headers. Missing trailing cells read as null.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of the first column whose header equals `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `(row, col)`. The outer `None` means the row has no such cell.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Trimmed text of a cell, empty for blank or missing cells.
    pub fn text(&self, row: usize, col: usize) -> String {
        self.cell(row, col)
            .map(cell_to_field)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// Write a cell.
    ///
    /// A short row is padded with null cells up to `col`; writing past the
    /// header width fails.
    pub fn set(&mut self, row: usize, col: usize, value: Cell) -> Result<(), String> {
        let width = self.headers.len();
        if col >= width {
            return Err(format!("column {} is outside the {} header column(s)", col, width));
        }
        let cells = self
            .rows
            .get_mut(row)
            .ok_or_else(|| format!("row {} does not exist", row))?;
        if cells.len() <= col {
            cells.resize(col + 1, None);
        }
        cells[col] = value;
        Ok(())
    }
}

/// A loaded provider report.
///
/// `table` only holds student rows. The "Point Possible" row, if the export
/// had one, is kept aside in `points_possible` for preview statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProviderTable {
    pub table: Table,
    pub points_possible: Option<Vec<Cell>>,
}

impl ProviderTable {
    /// Max-points value for a column, read from the metadata row.
    pub fn max_points(&self, column: &str) -> Option<String> {
        let col = self.table.column_index(column)?;
        let row = self.points_possible.as_ref()?;
        row.get(col)
            .map(cell_to_field)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Normalized identity for email matching.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// =============================================================================
// Merge options and results
// =============================================================================

/// How blank provider scores are written to the gradebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlankPolicy {
    /// Leave the existing gradebook cell untouched.
    #[default]
    LeaveUnset,
    /// Write numeric zero.
    SetZero,
}

impl BlankPolicy {
    pub fn from_flag(set_zero: bool) -> Self {
        if set_zero {
            BlankPolicy::SetZero
        } else {
            BlankPolicy::LeaveUnset
        }
    }
}

/// Counters accumulated by one merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub students_matched: usize,
    pub students_unmatched: usize,
    pub grades_updated: usize,
    pub blank_grades_processed: usize,
    pub selected_assignments: usize,
    pub mapped_assignments: usize,
}

impl MergeSummary {
    /// Labelled counters, in display order.
    pub fn metrics(&self) -> [(&'static str, usize); 6] {
        [
            ("Students Matched", self.students_matched),
            ("Students Not Found", self.students_unmatched),
            ("Grades Updated", self.grades_updated),
            ("Blank Grades Set to 0", self.blank_grades_processed),
            ("Selected Assignments", self.selected_assignments),
            ("Mapped Assignments", self.mapped_assignments),
        ]
    }
}
