//! Grade merging.
//!
//! - `engine`: Email join, blank policy and coercion on in-memory tables
//! - `pipeline`: Load both exports, merge, and serialize the updated gradebook

pub mod engine;
pub mod pipeline;

pub use engine::{merge, MergeOutcome, MergeRequest};
pub use pipeline::*;
