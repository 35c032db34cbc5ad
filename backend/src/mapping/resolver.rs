//! Resolve selected provider assignments to gradebook columns.
//!
//! Resolution order for one assignment:
//!
//! ```text
//! static table hit? ──yes──▶ term = fragment
//!        │no
//!        ▼
//!   term = assignment name
//!        │
//!        ▼
//! first column containing term ──▶ Substring
//!        │none
//!        ▼
//! first column containing any lowercase token ──▶ Keyword
//!        │none
//!        ▼
//!     omitted
//! ```
//!
//! Ties always go to the first column in gradebook order.

use serde::Serialize;

use super::MappingTable;
use crate::api::logs::{log_info, log_info_indent, log_warning_indent};

/// Gradebook columns that are never grade targets.
pub const PROTECTED_GRADEBOOK_COLUMNS: [&str; 6] = [
    "Email",
    "Last Name",
    "First Name",
    "OrgDefinedId",
    "Username",
    "End-of-Line Indicator",
];

/// Which search stage produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMethod {
    /// The column name contains the whole search term.
    Substring,
    /// The column name contains one of the term's lowercase words.
    Keyword,
}

/// One resolved assignment -> gradebook column pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMatch {
    pub assignment: String,
    pub column: String,
    pub search_term: String,
    pub from_static_table: bool,
    pub method: MatchMethod,
    /// Columns that satisfied the winning stage; the first one was taken.
    pub candidates: usize,
}

impl ColumnMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

/// Assignment -> gradebook column mapping for a single merge run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColumnCorrespondence {
    entries: Vec<ColumnMatch>,
}

impl ColumnCorrespondence {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnMatch> {
        self.entries.iter()
    }

    /// Gradebook column for `assignment`, if it was mapped.
    pub fn column_for(&self, assignment: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|m| m.assignment == assignment)
            .map(|m| m.column.as_str())
    }

    pub fn ambiguous(&self) -> impl Iterator<Item = &ColumnMatch> {
        self.entries.iter().filter(|m| m.is_ambiguous())
    }
}

fn is_protected(column: &str) -> bool {
    PROTECTED_GRADEBOOK_COLUMNS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(column.trim()))
}

/// Find the gradebook column for a search term.
///
/// Returns the column name, the stage that matched and how many columns
/// satisfied that stage.
pub fn find_gradebook_column<'a>(
    columns: &'a [String],
    search_term: &str,
) -> Option<(&'a str, MatchMethod, usize)> {
    if search_term.trim().is_empty() {
        return None;
    }

    let eligible: Vec<&'a str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !is_protected(c))
        .collect();

    let exact: Vec<&str> = eligible
        .iter()
        .copied()
        .filter(|c| c.contains(search_term))
        .collect();
    if let Some(first) = exact.first() {
        return Some((*first, MatchMethod::Substring, exact.len()));
    }

    let lowered = search_term.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    let keyword: Vec<&str> = eligible
        .iter()
        .copied()
        .filter(|c| {
            let col = c.to_lowercase();
            tokens.iter().any(|t| col.contains(t))
        })
        .collect();

    keyword
        .first()
        .map(|first| (*first, MatchMethod::Keyword, keyword.len()))
}

/// Build the correspondence for the current selection.
///
/// Duplicate selections are resolved once. Assignments that match nothing are
/// left out; callers see this as fewer mapped than selected assignments.
pub fn build_correspondence(
    selected: &[String],
    gradebook_columns: &[String],
    table: &MappingTable,
) -> ColumnCorrespondence {
    let mut entries: Vec<ColumnMatch> = Vec::new();

    log_info(format!("🗺️  Mapping {} selected assignment(s):", selected.len()));

    for assignment in selected {
        if entries.iter().any(|m| &m.assignment == assignment) {
            continue;
        }

        let fragment = table.fragment_for(assignment);
        let search_term = fragment.unwrap_or(assignment);

        match find_gradebook_column(gradebook_columns, search_term) {
            Some((column, method, candidates)) => {
                let entry = ColumnMatch {
                    assignment: assignment.clone(),
                    column: column.to_string(),
                    search_term: search_term.to_string(),
                    from_static_table: fragment.is_some(),
                    method,
                    candidates,
                };

                if entry.is_ambiguous() {
                    log_warning_indent(
                        format!(
                            "{} → {} (first of {} candidate columns)",
                            entry.assignment, entry.column, entry.candidates
                        ),
                        1,
                    );
                } else {
                    log_info_indent(format!("{} → {}", entry.assignment, entry.column), 1);
                }
                entries.push(entry);
            }
            None => {
                log_warning_indent(format!("{} → (no matching gradebook column)", assignment), 1);
            }
        }
    }

    ColumnCorrespondence { entries }
}
