//! The source-control surface the analyzer and pipeline consume.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// `owner/name` of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoTarget {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoTarget {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches(".git");
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(PipelineError::Configuration(format!(
                "repository target must look like owner/name, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository metadata needed to start an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    pub full_name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// Decoded file content plus its blob hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub path: String,
    pub content: String,
    pub sha: String,
}

/// A create-or-update write. `previous_sha` is required by the remote when
/// the path already exists.
#[derive(Debug, Clone)]
pub struct FileWrite<'a> {
    pub content: &'a str,
    pub message: &'a str,
    pub previous_sha: Option<&'a str>,
}

/// Remote source-control operations.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Read repository metadata; doubles as the reachability check.
    async fn repository(&self, repo: &RepoTarget) -> Result<RepoMetadata, PipelineError>;

    /// List a directory at a ref. `path` is empty for the root.
    async fn list_directory(
        &self,
        repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<Vec<DirEntry>, PipelineError>;

    /// Read and decode a file at a ref.
    async fn read_file(
        &self,
        repo: &RepoTarget,
        path: &str,
        reference: &str,
    ) -> Result<FileBlob, PipelineError>;

    /// Commit hash at the tip of a branch.
    async fn branch_head(&self, repo: &RepoTarget, branch: &str) -> Result<String, PipelineError>;

    /// Create `branch` pointing at `base_sha`.
    async fn create_branch(
        &self,
        repo: &RepoTarget,
        branch: &str,
        base_sha: &str,
    ) -> Result<(), PipelineError>;

    /// Create or update a file on a branch. Returns the new blob hash.
    async fn write_file(
        &self,
        repo: &RepoTarget,
        branch: &str,
        path: &str,
        write: FileWrite<'_>,
    ) -> Result<String, PipelineError>;

    /// Delete a file on a branch.
    async fn delete_file(
        &self,
        repo: &RepoTarget,
        branch: &str,
        path: &str,
        message: &str,
        sha: &str,
    ) -> Result<(), PipelineError>;

    /// Seal the branch with a descriptive commit on top of its current tip.
    /// Returns the new commit hash.
    async fn finalize_branch(
        &self,
        repo: &RepoTarget,
        branch: &str,
        message: &str,
    ) -> Result<String, PipelineError>;
}

/// Builds a host bound to one bearer token.
pub trait HostProvider: Send + Sync {
    fn connect(&self, token: &str) -> Arc<dyn RepositoryHost>;
}
