//! High-level pipeline API: load both exports, merge, serialize.
//!
//! # Example
//!
//! ```rust,ignore
//! use gradebridge::{update_grades_from_files, BlankPolicy, MergeOptions};
//! use std::path::Path;
//!
//! let output = update_grades_from_files(
//!     Path::new("gradebook.csv"),
//!     Path::new("netacad.csv"),
//!     &MergeOptions {
//!         selected: vec!["Checkpoint Exam: Network Access".into()],
//!         blank_policy: BlankPolicy::SetZero,
//!         ..Default::default()
//!     },
//! )?;
//! std::fs::write(&output.file_name, &output.csv)?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::engine::{merge, MergeOutcome, MergeRequest};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::assignments::{assignment_previews, extract_assignments, AssignmentPreview};
use crate::error::{PipelineError, PipelineResult};
use crate::mapping::MappingTable;
use crate::models::BlankPolicy;
use crate::parser::{
    load_gradebook_bytes, load_gradebook_file, load_provider_bytes, load_provider_file, write_csv,
    CsvInfo, ParseResult, ProviderParseResult,
};

/// File name offered for the updated gradebook.
pub const OUTPUT_FILE_NAME: &str = "updated_brightspace_grades.csv";

/// MIME type of the updated gradebook.
pub const OUTPUT_MIME_TYPE: &str = "text/csv";

/// Options for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOptions {
    /// Provider assignments to copy.
    #[serde(default)]
    pub selected: Vec<String>,

    /// Copy every gradeable assignment instead of `selected`.
    #[serde(default)]
    pub select_all: bool,

    #[serde(default)]
    pub blank_policy: BlankPolicy,

    /// Force a CSV delimiter instead of auto-detecting it.
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Static mapping table to use instead of the embedded one.
    #[serde(default)]
    pub mapping_path: Option<PathBuf>,
}

/// Result of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub outcome: MergeOutcome,
    /// Updated gradebook CSV, same delimiter as the input.
    pub csv: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub gradebook_info: CsvInfo,
    pub provider_info: CsvInfo,
    pub assignments: Vec<AssignmentPreview>,
}

/// Provider assignment listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentListing {
    pub assignments: Vec<AssignmentPreview>,
    pub csv_info: CsvInfo,
}

/// Load both exports from disk and merge them.
pub fn update_grades_from_files(
    gradebook_path: &Path,
    provider_path: &Path,
    options: &MergeOptions,
) -> PipelineResult<PipelineOutput> {
    log_info(format!("📖 Reading gradebook: {}", gradebook_path.display()));
    let gradebook = load_gradebook_file(gradebook_path, options.delimiter)?;
    log_info(format!("📖 Reading provider report: {}", provider_path.display()));
    let provider = load_provider_file(provider_path, options.delimiter)?;

    update_grades(gradebook, provider, options)
}

/// Same as [`update_grades_from_files`] for uploaded bytes.
pub fn update_grades_from_bytes(
    gradebook: &[u8],
    provider: &[u8],
    options: &MergeOptions,
) -> PipelineResult<PipelineOutput> {
    log_info("📖 Reading gradebook upload...");
    let gradebook = load_gradebook_bytes(gradebook, options.delimiter)?;
    log_info("📖 Reading provider upload...");
    let provider = load_provider_bytes(provider, options.delimiter)?;

    update_grades(gradebook, provider, options)
}

/// List the gradeable assignments of a provider upload.
pub fn list_assignments_from_bytes(
    provider: &[u8],
    delimiter: Option<char>,
) -> PipelineResult<AssignmentListing> {
    let ProviderParseResult { provider, info } = load_provider_bytes(provider, delimiter)?;
    Ok(AssignmentListing {
        assignments: assignment_previews(&provider),
        csv_info: info,
    })
}

/// List the gradeable assignments of a provider export on disk.
pub fn list_assignments_from_file(
    provider: &Path,
    delimiter: Option<char>,
) -> PipelineResult<AssignmentListing> {
    let bytes = std::fs::read(provider)?;
    list_assignments_from_bytes(&bytes, delimiter)
}

fn update_grades(
    gradebook: ParseResult,
    provider: ProviderParseResult,
    options: &MergeOptions,
) -> PipelineResult<PipelineOutput> {
    log_csv_info("Gradebook", &gradebook.info);
    log_csv_info("Provider", &provider.info);

    let mapping = MappingTable::load_or_builtin(options.mapping_path.as_deref())?;
    if let Some(path) = &options.mapping_path {
        log_success(format!(
            "Loaded {} mapping(s) from {}",
            mapping.len(),
            path.display()
        ));
    }

    let available = extract_assignments(&provider.provider.table);
    log_info(format!("📋 Provider has {} gradeable assignment(s)", available.len()));

    let selected = if options.select_all {
        available.clone()
    } else {
        options.selected.clone()
    };
    if selected.is_empty() {
        log_warning("No assignments selected, gradebook will be returned unchanged");
    }

    let request = MergeRequest::new(selected, options.blank_policy);
    let outcome = merge(&gradebook.table, &provider.provider.table, &request, &mapping);

    let csv = write_csv(&outcome.table, gradebook.info.delimiter)
        .map_err(|e| PipelineError::Export(e.to_string()))?;

    Ok(PipelineOutput {
        outcome,
        csv,
        file_name: OUTPUT_FILE_NAME.to_string(),
        mime_type: OUTPUT_MIME_TYPE.to_string(),
        gradebook_info: gradebook.info,
        provider_info: provider.info,
        assignments: assignment_previews(&provider.provider),
    })
}

fn log_csv_info(label: &str, info: &CsvInfo) {
    log_success(format!(
        "{}: {} rows, {} columns (encoding {}, delimiter '{}')",
        label,
        info.row_count,
        info.headers.len(),
        info.encoding,
        format_delimiter(info.delimiter)
    ));
}

/// Format delimiter for display
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::models::GradeValue;
    use std::io::Write;

    const GRADEBOOK: &str = "OrgDefinedId,Username,Last Name,First Name,Email,Quiz1 Grade,Checkpoint Exam - Network Access Points Grade,End-of-Line Indicator\n\
100,alice,Doe,Alice,a@x.com,,,#\n\
101,carol,Poe,Carol,carol@x.com,4,60,#\n";

    const PROVIDER: &str = "NAME,EMAIL,Quiz1,Checkpoint Exam: Network Access\n\
Point Possible,,10,100\n\
Alice,A@X.com ,,92\n\
Ghost,ghost@x.com,10,100\n";

    fn options(selected: &[&str], blank_policy: BlankPolicy) -> MergeOptions {
        MergeOptions {
            selected: selected.iter().map(|s| s.to_string()).collect(),
            blank_policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_set_zero() {
        let output = update_grades_from_bytes(
            GRADEBOOK.as_bytes(),
            PROVIDER.as_bytes(),
            &options(&["Quiz1"], BlankPolicy::SetZero),
        )
        .unwrap();

        let summary = output.outcome.summary;
        assert_eq!(summary.students_matched, 1);
        assert_eq!(summary.students_unmatched, 1);
        assert_eq!(summary.grades_updated, 1);
        assert_eq!(summary.blank_grades_processed, 1);

        let table = &output.outcome.table;
        let quiz = table.column_index("Quiz1 Grade").unwrap();
        assert_eq!(table.rows[0][quiz], Some(GradeValue::Number(0.0)));
        assert_eq!(table.text(0, 4), "a@x.com");

        assert_eq!(output.file_name, "updated_brightspace_grades.csv");
        assert_eq!(output.mime_type, "text/csv");
    }

    #[test]
    fn test_csv_output_only_changes_mapped_cells() {
        let output = update_grades_from_bytes(
            GRADEBOOK.as_bytes(),
            PROVIDER.as_bytes(),
            &options(&["Checkpoint Exam: Network Access"], BlankPolicy::LeaveUnset),
        )
        .unwrap();

        let text = String::from_utf8(output.csv).unwrap();
        assert_eq!(
            text,
            "OrgDefinedId,Username,Last Name,First Name,Email,Quiz1 Grade,Checkpoint Exam - Network Access Points Grade,End-of-Line Indicator\n\
100,alice,Doe,Alice,a@x.com,,92,#\n\
101,carol,Poe,Carol,carol@x.com,4,60,#\n"
        );
    }

    #[test]
    fn test_empty_selection_round_trips_csv() {
        let output = update_grades_from_bytes(
            GRADEBOOK.as_bytes(),
            PROVIDER.as_bytes(),
            &options(&[], BlankPolicy::SetZero),
        )
        .unwrap();

        assert_eq!(String::from_utf8(output.csv).unwrap(), GRADEBOOK);
        assert_eq!(output.outcome.summary.selected_assignments, 0);
    }

    #[test]
    fn test_select_all() {
        let opts = MergeOptions {
            select_all: true,
            blank_policy: BlankPolicy::SetZero,
            ..Default::default()
        };
        let output =
            update_grades_from_bytes(GRADEBOOK.as_bytes(), PROVIDER.as_bytes(), &opts).unwrap();

        assert_eq!(output.outcome.summary.selected_assignments, 2);
        assert_eq!(output.outcome.summary.mapped_assignments, 2);
        assert_eq!(output.assignments.len(), 2);
    }

    #[test]
    fn test_missing_gradebook_column_is_fatal() {
        let err = update_grades_from_bytes(
            b"Username,Last Name\nalice,Doe\n",
            PROVIDER.as_bytes(),
            &MergeOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Load(LoadError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_custom_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        let mapping_path = dir.path().join("mapping.json");
        std::fs::write(
            &mapping_path,
            r#"{ "mappings": { "Quiz1": "Checkpoint Exam - Network Access" } }"#,
        )
        .unwrap();

        let opts = MergeOptions {
            selected: vec!["Quiz1".into()],
            blank_policy: BlankPolicy::SetZero,
            mapping_path: Some(mapping_path),
            ..Default::default()
        };
        let output =
            update_grades_from_bytes(GRADEBOOK.as_bytes(), PROVIDER.as_bytes(), &opts).unwrap();

        let entry = output.outcome.correspondence.iter().next().unwrap();
        assert_eq!(entry.column, "Checkpoint Exam - Network Access Points Grade");
        assert!(entry.from_static_table);
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let gradebook_path = dir.path().join("gradebook.csv");
        let provider_path = dir.path().join("provider.csv");
        std::fs::File::create(&gradebook_path)
            .unwrap()
            .write_all(GRADEBOOK.as_bytes())
            .unwrap();
        std::fs::File::create(&provider_path)
            .unwrap()
            .write_all(PROVIDER.as_bytes())
            .unwrap();

        let output = update_grades_from_files(
            &gradebook_path,
            &provider_path,
            &options(&["Checkpoint Exam: Network Access"], BlankPolicy::LeaveUnset),
        )
        .unwrap();
        assert_eq!(output.outcome.summary.grades_updated, 1);

        let listing = list_assignments_from_file(&provider_path, None).unwrap();
        assert_eq!(listing.assignments[1].max_points, "100");
        assert_eq!(listing.assignments[1].completion, "100.0%");
    }
}
