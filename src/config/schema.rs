//! Configuration schema for agentcycle.toml.

use crate::analysis::AnalyzerOptions;
use crate::executor::ImprovementSettings;
use crate::github::DEFAULT_API_URL;
use crate::pipeline::DEFAULT_BRANCH_PREFIX;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Environment variable consulted when `github_token` is empty.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CyclerConfig {
    /// GitHub REST API root.
    pub github_api_url: String,

    /// Default bearer token for agents without their own credential.
    pub github_token: String,

    /// Target repository as `owner/name`. Empty disables self-improvement.
    pub repository: String,

    /// Branch proposals are cut from. Empty means the repository default.
    pub base_branch: String,

    /// Prefix of every proposal branch.
    pub branch_prefix: String,

    /// Finalize proposal branches with a summary commit.
    pub auto_commit: bool,

    /// Timeout applied to every HTTP request.
    pub request_timeout_secs: u64,

    /// Number of cycle reports kept in memory.
    pub report_capacity: usize,

    /// Proposals per analysis run.
    pub max_proposals: usize,

    /// Files fetched per analysis run.
    pub max_files: usize,

    /// Directory the analysis walk starts from.
    pub analysis_root: String,

    /// Source extensions the analyzer reads.
    pub source_extensions: Vec<String>,

    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,

    /// Tick interval for roles missing from `role_intervals`.
    pub default_interval_secs: u64,

    /// Path to the agents YAML seed list.
    pub agents_config_path: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Config version.
    pub version: u32,

    /// Tick interval per role (case-insensitive). Kept last so it
    /// serializes as a trailing TOML table.
    pub role_intervals: BTreeMap<String, u64>,
}

impl Default for CyclerConfig {
    fn default() -> Self {
        let analyzer = AnalyzerOptions::default();
        Self {
            github_api_url: DEFAULT_API_URL.into(),
            github_token: String::new(),
            repository: String::new(),
            base_branch: String::new(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.into(),
            auto_commit: false,
            request_timeout_secs: 30,
            report_capacity: crate::reports::DEFAULT_CAPACITY,
            max_proposals: analyzer.max_proposals,
            max_files: analyzer.max_files,
            analysis_root: analyzer.root,
            source_extensions: analyzer.extensions,
            exclude_dirs: analyzer.exclude_dirs,
            default_interval_secs: 60,
            agents_config_path: "~/.agentcycle/agents.yml".into(),
            log_level: "info".into(),
            version: 1,
            role_intervals: default_role_intervals(),
        }
    }
}

fn default_role_intervals() -> BTreeMap<String, u64> {
    [
        ("architect", 45),
        ("developer", 60),
        ("analyst", 90),
        ("security", 120),
        ("optimizer", 75),
    ]
    .into_iter()
    .map(|(role, secs)| (role.to_string(), secs))
    .collect()
}

impl CyclerConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved agents seed file path.
    pub fn resolved_agents_path(&self) -> String {
        self.resolve_path(&self.agents_config_path)
    }

    /// Configured token, else `GITHUB_TOKEN`.
    pub fn effective_token(&self) -> Option<String> {
        let configured = self.github_token.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Analyzer walk options, without a token.
    pub fn analyzer_options(&self) -> AnalyzerOptions {
        let base_branch = self.base_branch.trim();
        AnalyzerOptions {
            token: None,
            base_branch: (!base_branch.is_empty()).then(|| base_branch.to_string()),
            root: self.analysis_root.clone(),
            extensions: self.source_extensions.clone(),
            exclude_dirs: self.exclude_dirs.clone(),
            max_files: self.max_files,
            max_proposals: self.max_proposals,
        }
    }

    pub fn improvement_settings(&self) -> ImprovementSettings {
        ImprovementSettings {
            repository: self.repository.trim().to_string(),
            branch_prefix: self.branch_prefix.clone(),
            auto_commit: self.auto_commit,
            analyzer: self.analyzer_options(),
        }
    }
}
