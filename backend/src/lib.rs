//! # Gradebridge - merge provider grade reports into a gradebook
//!
//! Gradebridge copies selected assignment scores from a third-party provider
//! report into an LMS gradebook export, matching students by email.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Gradebook  │────▶│   Parser    │────▶│    Merge    │────▶│ Updated CSV │
//! │  Provider   │     │  (auto-enc) │     │  (mapping)  │     │  + summary  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gradebridge::{update_grades_from_files, MergeOptions};
//!
//! let options = MergeOptions {
//!     selected: vec!["Quiz1".into()],
//!     ..Default::default()
//! };
//! let result = update_grades_from_files("gradebook.csv".as_ref(), "provider.csv".as_ref(), &options)?;
//! println!("Updated {} grades", result.outcome.summary.grades_updated);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Tables, cells and merge counters
//! - [`parser`] - CSV loading with encoding/delimiter detection
//! - [`assignments`] - Gradeable assignment extraction
//! - [`mapping`] - Assignment to gradebook column resolution
//! - [`merge`] - Merge engine and file/bytes pipeline
//! - [`config`] - Environment settings
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod parser;

// Merging
pub mod assignments;
pub mod mapping;
pub mod merge;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    LoadError, LoadResult, MappingError, MappingResult, MergeError, PipelineError,
    PipelineResult, ServerError, ServerResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{normalize_email, BlankPolicy, Cell, GradeValue, MergeSummary, ProviderTable, Table};

// =============================================================================
// Re-exports - CSV Loading
// =============================================================================

pub use parser::{
    decode_bytes, detect_delimiter, detect_encoding, load_gradebook_bytes, load_gradebook_file,
    load_provider_bytes, load_provider_file, write_csv, CsvInfo, ParseResult, ProviderParseResult,
};

// =============================================================================
// Re-exports - Assignments & mapping
// =============================================================================

pub use assignments::{assignment_previews, extract_assignments, AssignmentPreview};
pub use mapping::{build_correspondence, ColumnCorrespondence, ColumnMatch, MappingTable};

// =============================================================================
// Re-exports - Merge
// =============================================================================

pub use merge::{
    list_assignments_from_bytes, list_assignments_from_file, merge, update_grades_from_bytes,
    update_grades_from_files, AssignmentListing, MergeOptions, MergeOutcome, MergeRequest,
    PipelineOutput, OUTPUT_FILE_NAME, OUTPUT_MIME_TYPE,
};

// =============================================================================
// Re-exports - Config & API
// =============================================================================

pub use config::Settings;
pub use api::types::{error_response, AssignmentsResponse, CsvMetadata, MergeResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
