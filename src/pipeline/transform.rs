//! The per-file content step of the pipeline.

use crate::types::FileChange;

/// Produces the bytes actually written for a create or update.
///
/// `current` is the file's content on the proposal branch for updates and
/// `None` for creates.
pub trait ContentTransform: Send + Sync {
    fn apply(&self, change: &FileChange, current: Option<&str>) -> String;
}

/// Writes the proposed content unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceContent;

impl ContentTransform for ReplaceContent {
    fn apply(&self, change: &FileChange, _current: Option<&str>) -> String {
        change.content.clone()
    }
}

/// Proposed content with exactly one trailing newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureTrailingNewline;

impl ContentTransform for EnsureTrailingNewline {
    fn apply(&self, change: &FileChange, _current: Option<&str>) -> String {
        let mut out = change.content.trim_end_matches('\n').to_string();
        out.push('\n');
        out
    }
}
