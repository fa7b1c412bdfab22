//! Remote code analysis: walk a repository tree, fetch source files and run
//! the detector battery over them.

pub mod detectors;

pub use detectors::{default_detectors, Detector, Language, SourceFile};

use crate::error::PipelineError;
use crate::github::{EntryKind, HostProvider, RepoTarget, RepositoryHost};
use crate::types::EnhancementProposal;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Knobs for one analysis session.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Bearer token. Absent or blank means no credential is configured.
    pub token: Option<String>,
    /// Branch to analyze; the repository default when `None`.
    pub base_branch: Option<String>,
    /// Directory to start the walk from ("" is the repository root).
    pub root: String,
    /// Recognized source extensions, without the dot.
    pub extensions: Vec<String>,
    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,
    pub max_files: usize,
    pub max_proposals: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            token: None,
            base_branch: None,
            root: String::new(),
            extensions: ["ts", "tsx", "js", "jsx", "mjs", "rs", "py"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_dirs: ["node_modules", ".git", "target", "dist", "build"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_files: 50,
            max_proposals: 5,
        }
    }
}

/// Connected state established by [`CodeAnalyzer::initialize`].
struct Session {
    host: Arc<dyn RepositoryHost>,
    repo: RepoTarget,
    branch: String,
    options: AnalyzerOptions,
}

/// Reads a remote repository and produces enhancement proposals.
pub struct CodeAnalyzer {
    provider: Arc<dyn HostProvider>,
    detectors: Arc<Vec<Box<dyn Detector>>>,
    session: Option<Session>,
}

impl CodeAnalyzer {
    pub fn new(provider: Arc<dyn HostProvider>, detectors: Arc<Vec<Box<dyn Detector>>>) -> Self {
        Self {
            provider,
            detectors,
            session: None,
        }
    }

    /// Analyzer with the built-in detector battery.
    pub fn with_default_detectors(provider: Arc<dyn HostProvider>) -> Self {
        Self::new(provider, Arc::new(default_detectors()))
    }

    /// Bind to a repository and verify it is reachable.
    pub async fn initialize(
        &mut self,
        repository: &str,
        options: AnalyzerOptions,
    ) -> Result<(), PipelineError> {
        if repository.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "no repository target configured".into(),
            ));
        }
        let repo: RepoTarget = repository.parse()?;

        let token = options
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::Auth("no repository credential configured".into()))?;

        let host = self.provider.connect(token);
        let meta = host.repository(&repo).await.map_err(|e| match e {
            PipelineError::NotFound(msg) => {
                PipelineError::NotFound(format!("repository {repo} is not reachable: {msg}"))
            }
            other => other,
        })?;

        let branch = options
            .base_branch
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or(meta.default_branch);
        info!("Analyzer bound to {} on {}", meta.full_name, branch);

        self.session = Some(Session {
            host,
            repo,
            branch,
            options,
        });
        Ok(())
    }

    /// Host of the current session, for handing to the pipeline.
    pub fn host(&self) -> Option<Arc<dyn RepositoryHost>> {
        self.session.as_ref().map(|s| s.host.clone())
    }

    pub fn repository(&self) -> Option<&RepoTarget> {
        self.session.as_ref().map(|s| &s.repo)
    }

    /// Branch the analysis reads from.
    pub fn base_branch(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.branch.as_str())
    }

    /// Enumerate, fetch and inspect source files. Returns at most
    /// `max_proposals` proposals in detector order.
    pub async fn analyze_codebase(&self) -> Result<Vec<EnhancementProposal>, PipelineError> {
        let session = self.session.as_ref().ok_or_else(|| {
            PipelineError::Configuration("analyzer used before initialize".into())
        })?;

        let paths = self.collect_source_paths(session).await?;
        debug!("Found {} candidate source files", paths.len());

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match session.host.read_file(&session.repo, &path, &session.branch).await {
                Ok(blob) => files.push(SourceFile::new(&blob.path, &blob.content, &blob.sha)),
                Err(e) if e.is_not_found() => warn!("Skipping {}: {}", path, e),
                Err(e) => return Err(e),
            }
        }

        let limit = session.options.max_proposals;
        let mut proposals = Vec::new();
        'outer: for detector in self.detectors.iter() {
            for file in &files {
                if proposals.len() >= limit {
                    break 'outer;
                }
                if let Some(proposal) = detector.inspect(file) {
                    debug!("{} flagged {}", detector.name(), file.path);
                    proposals.push(proposal);
                }
            }
        }

        info!(
            "Analysis of {} produced {} proposal(s) from {} file(s)",
            session.repo,
            proposals.len(),
            files.len()
        );
        Ok(proposals)
    }

    /// Breadth-first walk from the configured root.
    async fn collect_source_paths(&self, session: &Session) -> Result<Vec<String>, PipelineError> {
        let opts = &session.options;
        let mut queue = VecDeque::from([opts.root.trim_matches('/').to_string()]);
        let mut found = Vec::new();

        while let Some(dir) = queue.pop_front() {
            let entries = session
                .host
                .list_directory(&session.repo, &dir, &session.branch)
                .await?;

            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => {
                        if !opts.exclude_dirs.iter().any(|d| d == &entry.name) {
                            queue.push_back(entry.path);
                        }
                    }
                    EntryKind::File => {
                        if has_extension(&entry.name, &opts.extensions) {
                            found.push(entry.path);
                            if found.len() >= opts.max_files {
                                return Ok(found);
                            }
                        }
                    }
                    EntryKind::Other => {}
                }
            }
        }

        Ok(found)
    }
}

fn has_extension(name: &str, extensions: &[String]) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}
