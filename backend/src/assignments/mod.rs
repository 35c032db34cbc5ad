//! Assignment column discovery for provider reports.
//!
//! A provider column is a gradeable assignment when its name is not one of the
//! known identity/metadata columns and it mentions one of the assessment
//! keywords (`checkpoint`, `exam`, `quiz`, `test`, `activity`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{is_blank, ProviderTable, Table};

/// Lowercase keywords marking an assessment column.
pub const ASSIGNMENT_KEYWORDS: [&str; 5] = ["checkpoint", "exam", "quiz", "test", "activity"];

/// Provider columns that are never assignments, whatever their name contains.
pub const EXCLUDED_COLUMNS: [&str; 11] = [
    "NAME",
    "EMAIL",
    "ID",
    "STUDENT ID",
    "STATUS",
    "ROLE",
    "LAST LOGIN",
    "LAST ACTIVITY",
    "ENROLLMENT DATE",
    "COURSE PROGRESS",
    "TOTAL",
];

static KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?i){}", ASSIGNMENT_KEYWORDS.join("|"))).expect("keyword pattern is valid")
});

/// Display row for one assignment column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPreview {
    pub name: String,
    /// Value from the "Point Possible" row, empty when absent.
    pub max_points: String,
    pub completed: usize,
    pub total: usize,
    /// Completion ratio as a percentage string, e.g. `"66.7%"`.
    pub completion: String,
}

/// True when `column` names a metadata column.
pub fn is_excluded(column: &str) -> bool {
    let column = column.trim();
    EXCLUDED_COLUMNS.iter().any(|ex| ex.eq_ignore_ascii_case(column))
}

/// True when `column` is a gradeable assignment column.
pub fn is_gradeable(column: &str) -> bool {
    !is_excluded(column) && KEYWORD_PATTERN.is_match(column)
}

/// Gradeable columns in source order.
pub fn extract_assignments(table: &Table) -> Vec<String> {
    table
        .headers
        .iter()
        .filter(|h| is_gradeable(h))
        .cloned()
        .collect()
}

/// Format a completion ratio for display.
pub fn completion_percent(completed: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", completed as f64 * 100.0 / total as f64)
}

/// Per-assignment max points and completion statistics.
pub fn assignment_previews(provider: &ProviderTable) -> Vec<AssignmentPreview> {
    let table = &provider.table;
    let total = table.row_count();

    extract_assignments(table)
        .into_iter()
        .filter_map(|name| {
            let col = table.column_index(&name)?;
            let completed = table
                .rows
                .iter()
                .filter(|row| row.get(col).is_some_and(|cell| !is_blank(cell)))
                .count();

            Some(AssignmentPreview {
                max_points: provider.max_points(&name).unwrap_or_default(),
                completion: completion_percent(completed, total),
                name,
                completed,
                total,
            })
        })
        .collect()
}
