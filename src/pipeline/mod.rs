//! Enhancement pipeline: turns a proposal into a branch, file writes and an
//! optional finalize commit on the remote repository.
//!
//! Every proposal gets its own branch, so concurrent agents never write to
//! the same ref. File writes inside a proposal are not transactional: when
//! one fails, files already written stay on the branch and the failure is
//! reported on the outcome.

pub mod diff;
pub mod transform;

pub use transform::{ContentTransform, EnsureTrailingNewline, ReplaceContent};

use crate::error::PipelineError;
use crate::github::{FileWrite, RepoTarget, RepositoryHost};
use crate::types::{EnhancementProposal, FileChange, FileOperation};
use diff::DiffSummary;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default branch prefix for proposal branches.
pub const DEFAULT_BRANCH_PREFIX: &str = "ai-enhancement";

/// One file successfully written to the proposal branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub path: String,
    pub operation: FileOperation,
    pub summary: DiffSummary,
    /// Unified diff, truncated; empty for deletes.
    pub diff: String,
}

/// Result of applying one proposal.
#[derive(Debug)]
pub struct EnhancementOutcome {
    pub branch: String,
    pub applied: Vec<AppliedChange>,
    /// One `ProposalApplication` error per file that could not be written.
    pub failures: Vec<PipelineError>,
    /// Hash of the finalize commit when auto-commit was requested.
    pub finalized: Option<String>,
}

impl EnhancementOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies proposals to one repository.
pub struct EnhancementPipeline {
    host: Arc<dyn RepositoryHost>,
    repo: RepoTarget,
    base_branch: String,
    branch_prefix: String,
    transform: Arc<dyn ContentTransform>,
}

impl EnhancementPipeline {
    pub fn new(host: Arc<dyn RepositoryHost>, repo: RepoTarget, base_branch: &str) -> Self {
        Self {
            host,
            repo,
            base_branch: base_branch.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            transform: Arc::new(ReplaceContent),
        }
    }

    pub fn with_branch_prefix(mut self, prefix: &str) -> Self {
        self.branch_prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ContentTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// `<prefix>/<proposal id>`.
    pub fn branch_name(&self, proposal: &EnhancementProposal) -> String {
        format!("{}/{}", self.branch_prefix, proposal.id)
    }

    /// Apply a proposal and return the branch name, or `None` when the branch
    /// could not be created or finalized. Never propagates errors; partial
    /// file failures are logged and still return the branch.
    pub async fn implement_enhancement(
        &self,
        proposal: &EnhancementProposal,
        auto_commit: bool,
    ) -> Option<String> {
        match self.apply(proposal, auto_commit).await {
            Ok(outcome) => {
                for failure in &outcome.failures {
                    warn!("Proposal {} partially applied: {}", proposal.id, failure);
                }
                Some(outcome.branch)
            }
            Err(e) => {
                error!("Failed to implement proposal {}: {}", proposal.id, e);
                None
            }
        }
    }

    /// Apply a proposal with a typed outcome.
    pub async fn apply(
        &self,
        proposal: &EnhancementProposal,
        auto_commit: bool,
    ) -> Result<EnhancementOutcome, PipelineError> {
        let branch = self.branch_name(proposal);

        let base_sha = self.host.branch_head(&self.repo, &self.base_branch).await?;
        self.host
            .create_branch(&self.repo, &branch, &base_sha)
            .await?;
        info!(
            "Created branch {} from {}@{} for '{}'",
            branch,
            self.base_branch,
            short_sha(&base_sha),
            proposal.title
        );

        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for change in &proposal.files {
            match self.apply_change(&branch, proposal, change).await {
                Ok(done) => {
                    info!("{} {} on {} ({})", change.operation, change.path, branch, done.summary);
                    applied.push(done);
                }
                Err(e) => {
                    let err = PipelineError::application(&change.path, e);
                    warn!("{}", err);
                    failures.push(err);
                }
            }
        }

        let finalized = if auto_commit {
            let message = commit_message(proposal);
            let sha = self
                .host
                .finalize_branch(&self.repo, &branch, &message)
                .await?;
            info!("Finalized {} at {}", branch, short_sha(&sha));
            Some(sha)
        } else {
            None
        };

        Ok(EnhancementOutcome {
            branch,
            applied,
            failures,
            finalized,
        })
    }

    async fn apply_change(
        &self,
        branch: &str,
        proposal: &EnhancementProposal,
        change: &FileChange,
    ) -> Result<AppliedChange, PipelineError> {
        let message = format!("{} {}: {}", change.operation, change.path, proposal.title);

        match change.operation {
            FileOperation::Create => {
                let content = self.transform.apply(change, None);
                self.host
                    .write_file(
                        &self.repo,
                        branch,
                        &change.path,
                        FileWrite {
                            content: &content,
                            message: &message,
                            previous_sha: None,
                        },
                    )
                    .await?;
                Ok(AppliedChange {
                    path: change.path.clone(),
                    operation: change.operation,
                    summary: diff::summarize("", &content),
                    diff: diff::unified(&change.path, "", &content),
                })
            }
            FileOperation::Update => {
                let current = self.host.read_file(&self.repo, &change.path, branch).await?;
                let content = self.transform.apply(change, Some(&current.content));
                self.host
                    .write_file(
                        &self.repo,
                        branch,
                        &change.path,
                        FileWrite {
                            content: &content,
                            message: &message,
                            previous_sha: Some(&current.sha),
                        },
                    )
                    .await?;
                Ok(AppliedChange {
                    path: change.path.clone(),
                    operation: change.operation,
                    summary: diff::summarize(&current.content, &content),
                    diff: diff::unified(&change.path, &current.content, &content),
                })
            }
            FileOperation::Delete => {
                let current = self.host.read_file(&self.repo, &change.path, branch).await?;
                self.host
                    .delete_file(&self.repo, branch, &change.path, &message, &current.sha)
                    .await?;
                Ok(AppliedChange {
                    path: change.path.clone(),
                    operation: change.operation,
                    summary: DiffSummary {
                        added: 0,
                        removed: current.content.lines().count(),
                    },
                    diff: String::new(),
                })
            }
        }
    }
}

/// Message for the finalize commit.
pub fn commit_message(proposal: &EnhancementProposal) -> String {
    format!(
        "{}\n\n{}\n\nRationale: {}\nImpact: {}\nCategory: {}\nProposal: {}\n",
        proposal.title,
        proposal.description,
        proposal.rationale,
        proposal.estimated_impact,
        proposal.category,
        proposal.id
    )
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Impact};

    fn proposal() -> EnhancementProposal {
        EnhancementProposal {
            id: "stray-logging-01abc".into(),
            title: "Remove stray logging from src/a.ts".into(),
            description: "Logging calls at line 3".into(),
            files: Vec::new(),
            rationale: "Noise in production".into(),
            estimated_impact: Impact::Low,
            category: Category::Refactor,
        }
    }

    #[test]
    fn test_commit_message_embeds_classification() {
        let msg = commit_message(&proposal());
        assert!(msg.starts_with("Remove stray logging from src/a.ts\n\n"));
        assert!(msg.contains("Rationale: Noise in production"));
        assert!(msg.contains("Impact: low"));
        assert!(msg.contains("Category: refactor"));
        assert!(msg.contains("Proposal: stray-logging-01abc"));
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
    }
}
