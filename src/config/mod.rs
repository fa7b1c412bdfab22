pub mod schema;

pub use schema::{CyclerConfig, TOKEN_ENV_VAR};

use crate::github::RepoTarget;
use crate::reports::DEFAULT_CAPACITY;
use crate::types::AgentSeed;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the main config inside the home directory.
pub const CONFIG_FILE: &str = "agentcycle.toml";

/// Semantic problems found in a parsed config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("configuration invalid: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ConfigError>),
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl CyclerConfig {
    /// Check every constraint and report all violations together.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut errors = Vec::new();

        if reqwest::Url::parse(&self.github_api_url).is_err() {
            errors.push(invalid("github_api_url", &self.github_api_url, "not a valid URL"));
        }
        if !self.repository.trim().is_empty() {
            if let Err(e) = self.repository.parse::<RepoTarget>() {
                errors.push(invalid("repository", &self.repository, &e.to_string()));
            }
        }
        if self.branch_prefix.trim_matches('/').trim().is_empty() {
            errors.push(invalid("branch_prefix", "\"\"", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            errors.push(invalid("request_timeout_secs", 0, "must be at least 1"));
        }
        if self.report_capacity == 0 || self.report_capacity > DEFAULT_CAPACITY {
            errors.push(invalid(
                "report_capacity",
                self.report_capacity,
                &format!("must be between 1 and {DEFAULT_CAPACITY}"),
            ));
        }
        if self.max_proposals == 0 {
            errors.push(invalid("max_proposals", 0, "must be at least 1"));
        }
        if self.max_files == 0 {
            errors.push(invalid("max_files", 0, "must be at least 1"));
        }
        if self.default_interval_secs == 0 {
            errors.push(invalid("default_interval_secs", 0, "must be at least 1"));
        }
        for (role, secs) in &self.role_intervals {
            if *secs == 0 {
                errors.push(invalid(&format!("role_intervals.{role}"), 0, "must be at least 1"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Default home directory (~/.agentcycle).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".agentcycle"))
        .unwrap_or_else(|| PathBuf::from(".agentcycle"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<CyclerConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agentcycle config file")?;
        let config: CyclerConfig =
            toml::from_str(&contents).context("Failed to parse agentcycle config (TOML)")?;
        Ok(config)
    } else {
        debug!("No config at {:?}, using defaults", path);
        Ok(CyclerConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &CyclerConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Load agent seeds from the YAML file at `path`, or the defaults when it
/// does not exist.
pub fn load_agents(path: &Path) -> Result<Vec<AgentSeed>> {
    if !path.exists() {
        debug!("No agents file at {:?}, using defaults", path);
        return Ok(default_agent_seeds());
    }

    let contents = std::fs::read_to_string(path).context("Failed to read agents.yml")?;
    let seeds: Vec<AgentSeed> =
        serde_yaml::from_str(&contents).context("Failed to parse agents.yml")?;
    Ok(seeds)
}

/// Write agent seeds as YAML.
pub fn save_agents(seeds: &[AgentSeed], path: &Path) -> Result<()> {
    let contents = serde_yaml::to_string(seeds).context("Failed to serialize agents")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write agents file")?;
    Ok(())
}

/// One agent per built-in role.
pub fn default_agent_seeds() -> Vec<AgentSeed> {
    vec![
        AgentSeed::new("architect-1", "Architect", "architect"),
        AgentSeed::new("developer-1", "Developer", "developer"),
        AgentSeed::new("analyst-1", "Analyst", "analyst"),
        AgentSeed::new("security-1", "Security", "security"),
        AgentSeed::new("optimizer-1", "Optimizer", "optimizer"),
    ]
}
