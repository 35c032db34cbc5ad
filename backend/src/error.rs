//! Error types for the gradebridge merge pipeline.
//!
//! - [`LoadError`] - CSV decoding, parsing and required-column errors
//! - [`MappingError`] - Static assignment table loading errors
//! - [`MergeError`] - Setup, per-row and per-column merge failures
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while turning an uploaded file into a [`crate::models::Table`].
///
/// Every variant is fatal to the load of that file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// None of the candidate encodings could decode the input.
    #[error("Could not decode input (tried {tried})")]
    Decode { tried: String },

    /// Invalid CSV format.
    #[error("Invalid CSV format: {0}")]
    Parse(String),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// Delimiter is not a single ASCII character.
    #[error("Invalid delimiter '{0}': expected a single ASCII character")]
    InvalidDelimiter(String),

    /// Required columns are absent.
    #[error(
        "{source_name} CSV is missing required column(s) {}; available columns include: {}",
        quote_list(.missing),
        quote_list(.available)
    )]
    MissingColumns {
        source_name: String,
        missing: Vec<String>,
        available: Vec<String>,
    },
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        LoadError::Parse(err.to_string())
    }
}

fn quote_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors loading an external assignment mapping table.
#[derive(Debug, Error)]
pub enum MappingError {
    /// IO error.
    #[error("Mapping table IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Mapping table JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The table has no entries.
    #[error("Mapping table has no entries")]
    Empty,
}

// =============================================================================
// Merge Errors
// =============================================================================

/// Failures during a merge run.
///
/// Only [`MergeError::Setup`] aborts a run. Row and column failures are
/// collected on the outcome and processing continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeError {
    /// Failure before any row was processed.
    #[error("Merge setup failed: {0}")]
    Setup(String),

    /// A provider row could not be processed.
    #[error("Provider row {row}: {message}")]
    RowProcessing { row: usize, message: String },

    /// A single mapped column could not be written for a matched student.
    #[error("Provider row {row}, assignment '{assignment}' -> '{column}': {message}")]
    ColumnUpdate {
        row: usize,
        assignment: String,
        column: String,
        message: String,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by
/// [`crate::merge::pipeline::update_grades_from_files`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input loading error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Mapping table error.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not serialize the updated gradebook.
    #[error("Export error: {0}")]
    Export(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket or listener failure.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for mapping table operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
