//! REST API types for frontend integration.
//!
//! The merge response carries the counters, the resolved column mapping, any
//! skipped rows/columns and the updated gradebook itself, ready to be offered
//! as a download.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::assignments::AssignmentPreview;
use crate::mapping::ColumnMatch;
use crate::merge::pipeline::{format_delimiter, AssignmentListing, PipelineOutput};
use crate::models::MergeSummary;
use crate::parser::CsvInfo;

/// Response sent after a merge upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// RFC 3339 time the merge finished.
    pub generated_at: String,

    pub summary: MergeSummary,

    /// Summary counters with display labels, in display order.
    pub metrics: Vec<Metric>,

    pub mappings: Vec<ColumnMatch>,

    /// Skipped rows/columns, or the setup failure.
    pub issues: Vec<String>,

    pub file: ExportFile,

    pub gradebook: CsvMetadata,

    pub provider: CsvMetadata,
}

/// A labelled counter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub label: String,
    pub value: usize,
}

/// The updated gradebook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub mime_type: String,
    pub content: String,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<CsvInfo> for CsvMetadata {
    fn from(info: CsvInfo) -> Self {
        CsvMetadata {
            encoding: info.encoding,
            delimiter: format_delimiter(info.delimiter),
            row_count: info.row_count,
            columns: info.headers,
        }
    }
}

/// Response sent after an assignment listing upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsResponse {
    pub job_id: String,
    pub assignments: Vec<AssignmentPreview>,
    pub csv_info: CsvMetadata,
}

impl From<AssignmentListing> for AssignmentsResponse {
    fn from(listing: AssignmentListing) -> Self {
        AssignmentsResponse {
            job_id: Uuid::new_v4().to_string(),
            assignments: listing.assignments,
            csv_info: listing.csv_info.into(),
        }
    }
}

impl From<PipelineOutput> for MergeResponse {
    fn from(output: PipelineOutput) -> Self {
        let outcome = output.outcome;
        let summary = outcome.summary;

        let status = if outcome.is_aborted() {
            "error"
        } else if !outcome.issues.is_empty()
            || summary.mapped_assignments < summary.selected_assignments
            || outcome.correspondence.ambiguous().next().is_some()
        {
            "warning"
        } else {
            "ready"
        };

        let issues = outcome
            .setup_error
            .iter()
            .chain(outcome.issues.iter())
            .map(|e| e.to_string())
            .collect();

        MergeResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            summary,
            metrics: summary
                .metrics()
                .iter()
                .map(|(label, value)| Metric {
                    label: label.to_string(),
                    value: *value,
                })
                .collect(),
            mappings: outcome.correspondence.iter().cloned().collect(),
            issues,
            file: ExportFile {
                file_name: output.file_name,
                mime_type: output.mime_type,
                content: String::from_utf8_lossy(&output.csv).into_owned(),
            },
            gradebook: output.gradebook_info.into(),
            provider: output.provider_info.into(),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "summary": MergeSummary::default(),
        "mappings": [],
        "issues": [],
    })
}
