//! Grade merge engine.
//!
//! Joins provider rows to gradebook rows on normalized email and writes the
//! mapped assignment scores into a copy of the gradebook.
//!
//! ```text
//! provider row ──email──▶ gradebook row (first match)
//!      │                        │
//!      └── assignment cell ──▶ mapped column   (coerce / blank policy)
//! ```
//!
//! Failures are isolated: a bad column skips that column, a bad row skips
//! that row. Only a setup failure aborts, and then the caller gets the
//! original table back with a zeroed summary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::logs::{log_error, log_info, log_success, log_warning, log_warning_indent};
use crate::error::MergeError;
use crate::mapping::{build_correspondence, ColumnCorrespondence, MappingTable};
use crate::models::{
    cell_to_field, is_blank, normalize_email, BlankPolicy, Cell, GradeValue, MergeSummary, Table,
    GRADEBOOK_EMAIL, PROVIDER_EMAIL,
};

/// Caller choices for one merge run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// Provider assignment names to copy, in selection order, without duplicates.
    pub selected: Vec<String>,
    pub blank_policy: BlankPolicy,
}

impl MergeRequest {
    pub fn new<I, S>(selected: I, blank_policy: BlankPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in selected {
            let name = name.into();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            selected: unique,
            blank_policy,
        }
    }
}

/// Everything a merge run produced.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Updated copy of the gradebook (the original when setup failed).
    pub table: Table,
    pub summary: MergeSummary,
    pub correspondence: ColumnCorrespondence,
    /// Recovered row and column failures, in processing order.
    pub issues: Vec<MergeError>,
    pub setup_error: Option<MergeError>,
}

impl MergeOutcome {
    fn aborted(original: &Table, err: MergeError) -> Self {
        Self {
            table: original.clone(),
            summary: MergeSummary::default(),
            correspondence: ColumnCorrespondence::default(),
            issues: Vec::new(),
            setup_error: Some(err),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.setup_error.is_some()
    }
}

/// A mapped assignment with its resolved column positions.
struct Target<'a> {
    assignment: &'a str,
    column: &'a str,
    gradebook_col: usize,
    provider_col: Option<usize>,
}

/// State built before any row is touched.
struct MergeSetup {
    working: Table,
    correspondence: ColumnCorrespondence,
    gradebook_index: HashMap<String, usize>,
    provider_email_col: usize,
}

/// Merge provider scores into a copy of the gradebook.
///
/// `provider` holds student rows only; the "Point Possible" row must already
/// be removed (the loader does this).
pub fn merge(
    gradebook: &Table,
    provider: &Table,
    request: &MergeRequest,
    mapping: &MappingTable,
) -> MergeOutcome {
    let setup = match prepare(gradebook, provider, request, mapping) {
        Ok(setup) => setup,
        Err(err) => {
            log_error(err.to_string());
            return MergeOutcome::aborted(gradebook, err);
        }
    };

    let MergeSetup {
        mut working,
        correspondence,
        gradebook_index,
        provider_email_col,
    } = setup;

    let targets: Vec<Target<'_>> = correspondence
        .iter()
        .filter_map(|m| {
            Some(Target {
                assignment: &m.assignment,
                column: &m.column,
                gradebook_col: working.column_index(&m.column)?,
                provider_col: provider.column_index(&m.assignment),
            })
        })
        .collect();

    let mut summary = MergeSummary {
        selected_assignments: request.selected.len(),
        mapped_assignments: correspondence.len(),
        ..Default::default()
    };
    let mut issues = Vec::new();

    log_info(format!(
        "⚙️  Merging {} provider row(s) into {} gradebook row(s)...",
        provider.row_count(),
        working.row_count()
    ));

    for (row_idx, row) in provider.rows.iter().enumerate() {
        let ctx = RowContext {
            row_number: row_idx + 1,
            row,
            provider_email_col,
            gradebook_index: &gradebook_index,
            targets: &targets,
            blank_policy: request.blank_policy,
        };

        if let Err(err) = ctx.process(&mut working, &mut summary, &mut issues) {
            log_warning(err.to_string());
            issues.push(err);
        }
    }

    log_summary(&summary, issues.len());

    MergeOutcome {
        table: working,
        summary,
        correspondence,
        issues,
        setup_error: None,
    }
}

fn prepare(
    gradebook: &Table,
    provider: &Table,
    request: &MergeRequest,
    mapping: &MappingTable,
) -> Result<MergeSetup, MergeError> {
    let working = gradebook.clone();

    let gradebook_email_col = working.column_index(GRADEBOOK_EMAIL).ok_or_else(|| {
        MergeError::Setup(format!("gradebook has no '{}' column", GRADEBOOK_EMAIL))
    })?;
    let provider_email_col = provider.column_index(PROVIDER_EMAIL).ok_or_else(|| {
        MergeError::Setup(format!("provider report has no '{}' column", PROVIDER_EMAIL))
    })?;

    let correspondence = build_correspondence(&request.selected, &working.headers, mapping);

    let mut gradebook_index = HashMap::new();
    for (idx, row) in working.rows.iter().enumerate() {
        let email = row.get(gradebook_email_col).map(cell_to_field).unwrap_or_default();
        let email = normalize_email(&email);
        if !email.is_empty() {
            gradebook_index.entry(email).or_insert(idx);
        }
    }

    Ok(MergeSetup {
        working,
        correspondence,
        gradebook_index,
        provider_email_col,
    })
}

struct RowContext<'a> {
    /// 1-based position among provider student rows.
    row_number: usize,
    row: &'a [Cell],
    provider_email_col: usize,
    gradebook_index: &'a HashMap<String, usize>,
    targets: &'a [Target<'a>],
    blank_policy: BlankPolicy,
}

impl RowContext<'_> {
    fn process(
        &self,
        working: &mut Table,
        summary: &mut MergeSummary,
        issues: &mut Vec<MergeError>,
    ) -> Result<(), MergeError> {
        let email_cell = self
            .row
            .get(self.provider_email_col)
            .ok_or_else(|| MergeError::RowProcessing {
                row: self.row_number,
                message: format!(
                    "row has {} cell(s), no '{}' value",
                    self.row.len(),
                    PROVIDER_EMAIL
                ),
            })?;

        let email = normalize_email(&cell_to_field(email_cell));
        if email.is_empty() {
            return Ok(());
        }

        let Some(&gradebook_row) = self.gradebook_index.get(&email) else {
            summary.students_unmatched += 1;
            return Ok(());
        };
        summary.students_matched += 1;

        for target in self.targets {
            if let Err(err) = self.apply(target, gradebook_row, working, summary) {
                log_warning_indent(err.to_string(), 1);
                issues.push(err);
            }
        }

        Ok(())
    }

    fn apply(
        &self,
        target: &Target<'_>,
        gradebook_row: usize,
        working: &mut Table,
        summary: &mut MergeSummary,
    ) -> Result<(), MergeError> {
        let column_error = |message: String| MergeError::ColumnUpdate {
            row: self.row_number,
            assignment: target.assignment.to_string(),
            column: target.column.to_string(),
            message,
        };

        let provider_col = target
            .provider_col
            .ok_or_else(|| column_error("provider report has no such column".to_string()))?;
        // A short row ends before the column: the cell is null.
        let cell = self.row.get(provider_col).cloned().flatten();

        let (value, blank) = if is_blank(&cell) {
            match self.blank_policy {
                BlankPolicy::LeaveUnset => return Ok(()),
                BlankPolicy::SetZero => (GradeValue::Number(0.0), true),
            }
        } else {
            (coerce_cell(&cell), false)
        };

        working
            .set(gradebook_row, target.gradebook_col, Some(value))
            .map_err(column_error)?;

        summary.grades_updated += 1;
        if blank {
            summary.blank_grades_processed += 1;
        }
        Ok(())
    }
}

/// Number if the cell parses as a float, trimmed text otherwise.
fn coerce_cell(cell: &Cell) -> GradeValue {
    match cell {
        Some(GradeValue::Number(n)) => GradeValue::Number(*n),
        Some(GradeValue::Text(s)) => GradeValue::coerce(s),
        None => GradeValue::Number(0.0),
    }
}

fn log_summary(summary: &MergeSummary, issue_count: usize) {
    log_success(format!(
        "{} matched, {} not found, {} grade(s) updated ({} blank set to 0)",
        summary.students_matched,
        summary.students_unmatched,
        summary.grades_updated,
        summary.blank_grades_processed
    ));
    if summary.mapped_assignments < summary.selected_assignments {
        log_warning(format!(
            "Only {} of {} selected assignment(s) mapped to a gradebook column",
            summary.mapped_assignments, summary.selected_assignments
        ));
    }
    if issue_count > 0 {
        log_warning(format!("{} row/column issue(s) skipped", issue_count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cell_from_field;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| cell_from_field(c)).collect())
                .collect(),
        )
    }

    fn gradebook() -> Table {
        table(
            &["Email", "Last Name", "First Name", "Quiz1 Grade", "Checkpoint Exam - Network Access Points Grade"],
            &[
                &["a@x.com", "Doe", "Alice", "", "50"],
                &["Bob@X.com", "Roe", "Bob", "3", ""],
            ],
        )
    }

    fn provider() -> Table {
        table(
            &["NAME", "EMAIL", "Quiz1", "Checkpoint Exam: Network Access"],
            &[
                &["Alice", "a@x.com", "", "85.5"],
                &["Bob", " BOB@x.com ", "Pass", " "],
            ],
        )
    }

    fn run(selected: &[&str], policy: BlankPolicy) -> MergeOutcome {
        merge(
            &gradebook(),
            &provider(),
            &MergeRequest::new(selected.iter().copied(), policy),
            &MappingTable::builtin(),
        )
    }

    #[test]
    fn test_empty_selection_leaves_table_identical() {
        for policy in [BlankPolicy::LeaveUnset, BlankPolicy::SetZero] {
            let outcome = run(&[], policy);
            assert_eq!(outcome.table, gradebook());
            assert_eq!(outcome.summary.grades_updated, 0);
            assert_eq!(outcome.summary.students_matched, 2);
        }
    }

    #[test]
    fn test_numeric_and_text_coercion() {
        let outcome = run(&["Quiz1", "Checkpoint Exam: Network Access"], BlankPolicy::LeaveUnset);

        assert_eq!(outcome.table.rows[0][4], Some(GradeValue::Number(85.5)));
        assert_eq!(outcome.table.rows[1][3], Some(GradeValue::Text("Pass".into())));
        assert_eq!(outcome.summary.grades_updated, 2);
        assert_eq!(outcome.summary.mapped_assignments, 2);
    }

    #[test]
    fn test_leave_unset_keeps_existing_values() {
        let outcome = run(&["Checkpoint Exam: Network Access"], BlankPolicy::LeaveUnset);

        // Bob's provider cell is " ", his gradebook cell stays blank.
        assert_eq!(outcome.table.rows[1][4], None);
        assert_eq!(outcome.summary.grades_updated, 1);
        assert_eq!(outcome.summary.blank_grades_processed, 0);
    }

    #[test]
    fn test_leave_unset_keeps_existing_grade() {
        let gradebook = table(
            &["Email", "Last Name", "First Name", "Quiz1 Grade"],
            &[&["a@x.com", "Doe", "Alice", "42"]],
        );
        let provider = table(&["NAME", "EMAIL", "Quiz1"], &[&["Alice", "a@x.com", ""]]);
        let outcome = merge(
            &gradebook,
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::LeaveUnset),
            &MappingTable::builtin(),
        );

        assert_eq!(outcome.table.rows[0][3], Some(GradeValue::Text("42".into())));
        assert_eq!(outcome.table, gradebook);
        assert_eq!(outcome.summary.students_matched, 1);
        assert_eq!(outcome.summary.grades_updated, 0);
    }

    #[test]
    fn test_set_zero_writes_numeric_zero() {
        let outcome = run(&["Quiz1", "Checkpoint Exam: Network Access"], BlankPolicy::SetZero);

        assert_eq!(outcome.table.rows[0][3], Some(GradeValue::Number(0.0)));
        assert_eq!(outcome.table.rows[1][4], Some(GradeValue::Number(0.0)));
        assert_eq!(outcome.summary.grades_updated, 4);
        assert_eq!(outcome.summary.blank_grades_processed, 2);
    }

    #[test]
    fn test_matched_counted_once_per_row() {
        let outcome = run(&["Quiz1", "Checkpoint Exam: Network Access"], BlankPolicy::SetZero);
        assert_eq!(outcome.summary.students_matched, 2);
        assert_eq!(outcome.summary.students_unmatched, 0);
    }

    #[test]
    fn test_original_email_case_preserved() {
        let outcome = run(&["Quiz1"], BlankPolicy::SetZero);
        assert_eq!(outcome.table.text(1, 0), "Bob@X.com");
    }

    #[test]
    fn test_unknown_email_counts_unmatched() {
        let provider = table(&["NAME", "EMAIL", "Quiz1"], &[&["Ghost", "ghost@x.com", "100"]]);
        let outcome = merge(
            &gradebook(),
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert_eq!(outcome.summary.students_unmatched, 1);
        assert_eq!(outcome.summary.students_matched, 0);
        assert_eq!(outcome.table, gradebook());
    }

    #[test]
    fn test_blank_provider_email_is_not_counted() {
        let provider = table(&["NAME", "EMAIL", "Quiz1"], &[&["Nobody", "  ", "100"]]);
        let outcome = merge(
            &gradebook(),
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert_eq!(outcome.summary.students_matched, 0);
        assert_eq!(outcome.summary.students_unmatched, 0);
    }

    #[test]
    fn test_duplicate_gradebook_email_first_wins() {
        let gradebook = table(
            &["Email", "Last Name", "First Name", "Quiz1 Grade"],
            &[&["a@x.com", "Doe", "Alice", ""], &["A@x.com", "Doe", "Alias", ""]],
        );
        let provider = table(&["NAME", "EMAIL", "Quiz1"], &[&["Alice", "a@x.com", "7"]]);
        let outcome = merge(
            &gradebook,
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::LeaveUnset),
            &MappingTable::builtin(),
        );

        assert_eq!(outcome.table.rows[0][3], Some(GradeValue::Number(7.0)));
        assert_eq!(outcome.table.rows[1][3], None);
    }

    #[test]
    fn test_missing_gradebook_email_aborts_with_original() {
        let gradebook = table(&["Mail", "Quiz1 Grade"], &[&["a@x.com", "1"]]);
        let outcome = merge(
            &gradebook,
            &provider(),
            &MergeRequest::new(["Quiz1"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert!(outcome.is_aborted());
        assert!(matches!(outcome.setup_error, Some(MergeError::Setup(_))));
        assert_eq!(outcome.table, gradebook);
        assert_eq!(outcome.summary, MergeSummary::default());
    }

    #[test]
    fn test_short_gradebook_row_is_padded_for_write() {
        let mut gradebook = gradebook();
        gradebook.rows[0].truncate(3);

        let outcome = merge(
            &gradebook,
            &provider(),
            &MergeRequest::new(["Quiz1", "Checkpoint Exam: Network Access"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.table.rows[0].len(), 5);
        assert_eq!(outcome.table.rows[0][3], Some(GradeValue::Number(0.0)));
        assert_eq!(outcome.table.rows[0][4], Some(GradeValue::Number(85.5)));
        assert_eq!(outcome.summary.grades_updated, 4);
    }

    #[test]
    fn test_short_gradebook_row_receives_grade() {
        let gradebook = table(
            &["Email", "Last Name", "First Name", "Quiz1 Grade"],
            &[&["a@x.com", "Doe", "Alice"]],
        );
        let provider = table(&["NAME", "EMAIL", "Quiz1"], &[&["Alice", "a@x.com", "9"]]);
        let outcome = merge(
            &gradebook,
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::LeaveUnset),
            &MappingTable::builtin(),
        );

        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.summary.grades_updated, 1);
        assert_eq!(outcome.table.rows[0][3], Some(GradeValue::Number(9.0)));
    }

    #[test]
    fn test_short_provider_row_reads_as_blank() {
        let gradebook = table(
            &["Email", "Last Name", "First Name", "Quiz1 Grade", "Quiz2 Grade"],
            &[&["a@x.com", "Doe", "Alice", "", ""]],
        );
        let provider = table(&["NAME", "EMAIL", "Quiz1", "Quiz2"], &[&["Alice", "a@x.com", "9"]]);

        let outcome = merge(
            &gradebook,
            &provider,
            &MergeRequest::new(["Quiz2"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.table.rows[0][4], Some(GradeValue::Number(0.0)));
        assert_eq!(outcome.summary.blank_grades_processed, 1);

        let outcome = merge(
            &gradebook,
            &provider,
            &MergeRequest::new(["Quiz2"], BlankPolicy::LeaveUnset),
            &MappingTable::builtin(),
        );
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.table, gradebook);
        assert_eq!(outcome.summary.grades_updated, 0);
    }

    #[test]
    fn test_ragged_provider_row_is_skipped() {
        let mut provider = provider();
        provider.rows[0].truncate(1);

        let outcome = merge(
            &gradebook(),
            &provider,
            &MergeRequest::new(["Quiz1"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert!(matches!(outcome.issues[0], MergeError::RowProcessing { row: 1, .. }));
        assert_eq!(outcome.summary.students_matched, 1);
        assert_eq!(outcome.table.rows[1][3], Some(GradeValue::Text("Pass".into())));
    }

    #[test]
    fn test_selection_not_in_provider_reports_column_issue() {
        let outcome = run(&["Final TEST"], BlankPolicy::SetZero);

        // Neither word appears in a gradebook column, so nothing maps.
        assert_eq!(outcome.summary.mapped_assignments, 0);
        assert!(outcome.issues.is_empty());

        let gradebook = table(
            &["Email", "Last Name", "First Name", "Final Test Grade"],
            &[&["a@x.com", "Doe", "Alice", ""]],
        );
        let outcome = merge(
            &gradebook,
            &provider(),
            &MergeRequest::new(["Final Test"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );
        assert_eq!(outcome.summary.mapped_assignments, 1);
        assert_eq!(outcome.issues.len(), 1);
        assert!(matches!(outcome.issues[0], MergeError::ColumnUpdate { .. }));
    }

    #[test]
    fn test_input_table_untouched() {
        let original = gradebook();
        let outcome = merge(
            &original,
            &provider(),
            &MergeRequest::new(["Quiz1"], BlankPolicy::SetZero),
            &MappingTable::builtin(),
        );

        assert_ne!(outcome.table, original);
        assert_eq!(original, gradebook());
    }

    #[test]
    fn test_request_dedupes_selection() {
        let request = MergeRequest::new(["Quiz1", "Quiz2", "Quiz1"], BlankPolicy::LeaveUnset);
        assert_eq!(request.selected, vec!["Quiz1", "Quiz2"]);
    }
}
