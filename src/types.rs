//! Shared types used across the cycle runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Agent state machine
// ---------------------------------------------------------------------------

/// Runtime states an agent transitions through.
///
/// idle --start--> active --tick--> cycling --ok--> active
///                                  cycling --err--> error --tick--> cycling
/// any --stop--> idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    /// Registered but the scheduler is not running.
    #[default]
    Idle,
    /// Timer armed, waiting for the next tick.
    Active,
    /// A cycle is executing.
    Cycling,
    /// Accepted in agent snapshots; the scheduler itself never enters it.
    Analyzing,
    /// The last cycle failed; the next tick retries.
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Cycling => write!(f, "cycling"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Per-agent cycle counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub total_cycles: u64,
    pub successful_cycles: u64,
    /// Wall time of the most recent successful cycle.
    pub last_cycle_ms: Option<u64>,
    /// Running mean over successful cycles.
    pub avg_cycle_ms: f64,
}

impl CycleStats {
    /// Fold one successful cycle into the counters.
    pub fn record_success(&mut self, elapsed_ms: u64) {
        self.total_cycles += 1;
        self.successful_cycles += 1;
        self.last_cycle_ms = Some(elapsed_ms);
        let n = self.successful_cycles as f64;
        self.avg_cycle_ms += (elapsed_ms as f64 - self.avg_cycle_ms) / n;
    }

    /// Fraction of cycles that succeeded, `None` before the first cycle.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_cycles == 0 {
            None
        } else {
            Some(self.successful_cycles as f64 / self.total_cycles as f64)
        }
    }
}

/// A named autonomous unit with its own cycle counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
    /// Number of the last successfully completed cycle.
    pub current_cycle: u64,
    pub last_activity: DateTime<Utc>,
    pub cycle_stats: CycleStats,
    /// Name of the credential this agent uses for repository access.
    #[serde(default)]
    pub credential: Option<String>,
}

/// Partial agent description used to register a new agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub credential: Option<String>,
}

impl AgentSeed {
    pub fn new(id: &str, name: &str, role: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: name.to_string(),
            role: role.to_string(),
            credential: None,
        }
    }

    /// Build a fresh agent record from this seed.
    pub fn into_agent(self, now: DateTime<Utc>) -> Agent {
        Agent {
            id: self
                .id
                .unwrap_or_else(|| ulid::Ulid::new().to_string().to_lowercase()),
            name: self.name,
            role: self.role,
            status: AgentStatus::Idle,
            current_cycle: 0,
            last_activity: now,
            cycle_stats: CycleStats::default(),
            credential: self.credential,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// The four kinds of work a cycle can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleType {
    ToolDiscovery,
    SelfAnalysis,
    StateSave,
    SelfImprovement,
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolDiscovery => write!(f, "tool-discovery"),
            Self::SelfAnalysis => write!(f, "self-analysis"),
            Self::StateSave => write!(f, "state-save"),
            Self::SelfImprovement => write!(f, "self-improvement"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Completed,
    Failed,
    InProgress,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::InProgress => write!(f, "in-progress"),
        }
    }
}

/// Immutable record of one cycle's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub id: String,
    pub agent_id: String,
    pub cycle_number: u64,
    pub cycle_type: CycleType,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    pub findings: Vec<String>,
    pub improvements: Vec<String>,
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Enhancement proposals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One file touched by a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// New content; ignored for deletes.
    pub content: String,
    pub operation: FileOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    BugFix,
    Performance,
    Feature,
    Refactor,
    Security,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BugFix => write!(f, "bug-fix"),
            Self::Performance => write!(f, "performance"),
            Self::Feature => write!(f, "feature"),
            Self::Refactor => write!(f, "refactor"),
            Self::Security => write!(f, "security"),
        }
    }
}

/// A candidate code change produced by heuristic analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementProposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub files: Vec<FileChange>,
    pub rationale: String,
    pub estimated_impact: Impact,
    pub category: Category,
}
