//! Assignment mapping table - provider titles to gradebook column fragments.
//!
//! The table is data, not logic: a default covering the reference checkpoint
//! exams is embedded at compile time from `data/assignment_mapping.json`, and
//! institutions can point the loader at their own JSON file instead.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "description": "...",
//!   "mappings": {
//!     "Checkpoint Exam: Network Access": "Checkpoint Exam - Network Access Points Grade"
//!   }
//! }
//! ```

pub mod resolver;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{MappingError, MappingResult};

pub use resolver::{
    build_correspondence, find_gradebook_column, ColumnCorrespondence, ColumnMatch, MatchMethod,
    PROTECTED_GRADEBOOK_COLUMNS,
};

const BUILTIN_TABLE: &str = include_str!("../../data/assignment_mapping.json");

fn default_version() -> String {
    "1.0".to_string()
}

/// Provider assignment title -> gradebook column name fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    pub mappings: HashMap<String, String>,
}

impl MappingTable {
    /// The embedded reference table.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_TABLE).expect("Invalid embedded mapping table")
    }

    /// Parse a table from JSON.
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let table: MappingTable = serde_json::from_str(json)?;
        if table.mappings.is_empty() {
            return Err(MappingError::Empty);
        }
        Ok(table)
    }

    /// Load a table from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> MappingResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Load `path` when given, the embedded table otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> MappingResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    /// Gradebook fragment for an exact provider title.
    pub fn fragment_for(&self, assignment: &str) -> Option<&str> {
        self.mappings.get(assignment).map(String::as_str)
    }

    /// Entries sorted by provider title, for display.
    pub fn sorted_entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .mappings
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort();
        entries
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_has_reference_entries() {
        let table = MappingTable::builtin();
        assert_eq!(table.len(), 12);
        assert_eq!(
            table.fragment_for("Checkpoint Exam: Network Access"),
            Some("Checkpoint Exam - Network Access Points Grade")
        );
        assert_eq!(table.fragment_for("checkpoint exam: network access"), None);
    }

    #[test]
    fn test_load_custom_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "mappings": {{ "Final Exam": "Final Exam Points Grade" }} }}"#).unwrap();

        let table = MappingTable::load(file.path()).unwrap();
        assert_eq!(table.version, "1.0");
        assert_eq!(table.fragment_for("Final Exam"), Some("Final Exam Points Grade"));
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = MappingTable::from_json(r#"{ "mappings": {} }"#).unwrap_err();
        assert!(matches!(err, MappingError::Empty));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappingTable::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, MappingError::Io(_)));
    }

    #[test]
    fn test_sorted_entries() {
        let table = MappingTable::builtin();
        let entries = table.sorted_entries();
        assert_eq!(entries[0].0, "Checkpoint Exam: ARP, DNS, DHCP and the Transport Layer");
    }
}
