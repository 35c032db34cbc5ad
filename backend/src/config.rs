//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is honored); CLI flags
//! override them.
//!
//! | Variable                   | Default | Meaning                          |
//! |----------------------------|---------|----------------------------------|
//! | `GRADEBRIDGE_PORT`         | `3000`  | HTTP server port                 |
//! | `GRADEBRIDGE_MAPPING_FILE` | unset   | JSON assignment mapping override |

use std::env;
use std::path::PathBuf;

pub const PORT_VAR: &str = "GRADEBRIDGE_PORT";
pub const MAPPING_FILE_VAR: &str = "GRADEBRIDGE_MAPPING_FILE";

pub const DEFAULT_PORT: u16 = 3000;

/// Maximum accepted upload size per request (in bytes).
///
/// 20 MB, far above any course roster export.
pub const MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub mapping_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mapping_file: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup(PORT_VAR)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            mapping_file: lookup(MAPPING_FILE_VAR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Prefer an explicit CLI mapping path over the environment one.
    pub fn mapping_path(&self, cli: Option<PathBuf>) -> Option<PathBuf> {
        cli.or_else(|| self.mapping_file.clone())
    }
}
