//! Cycle execution: resolve the cycle type for an agent's next cycle and run
//! the matching handler.
//!
//! The executor never fails. Handler errors are turned into a failed report
//! plus the error itself on the returned [`CycleOutcome`], which the
//! scheduler inspects to decide the agent's next status.

mod handlers;

use crate::analysis::{default_detectors, AnalyzerOptions, Detector};
use crate::clock::Clock;
use crate::credentials::CredentialSource;
use crate::error::PipelineError;
use crate::github::HostProvider;
use crate::pipeline::{ContentTransform, ReplaceContent, DEFAULT_BRANCH_PREFIX};
use crate::types::{Agent, CycleReport, CycleType, ReportStatus};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Map a cycle number to its type.
///
/// Rules are checked in this order and the first match wins, so 12 is a
/// self-improvement cycle even though it is also divisible by 3 and 2.
pub fn determine_cycle_type(n: u64) -> CycleType {
    if n % 4 == 0 {
        CycleType::SelfImprovement
    } else if n % 3 == 0 {
        CycleType::StateSave
    } else if n % 2 == 0 {
        CycleType::SelfAnalysis
    } else {
        CycleType::ToolDiscovery
    }
}

/// Where and how self-improvement cycles apply their proposals.
#[derive(Debug, Clone)]
pub struct ImprovementSettings {
    /// `owner/name`; empty disables self-improvement.
    pub repository: String,
    pub branch_prefix: String,
    pub auto_commit: bool,
    /// Walk/limit options; the token is filled in per agent.
    pub analyzer: AnalyzerOptions,
}

impl Default for ImprovementSettings {
    fn default() -> Self {
        Self {
            repository: String::new(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            auto_commit: false,
            analyzer: AnalyzerOptions::default(),
        }
    }
}

/// Result of one cycle, successful or not.
#[derive(Debug)]
pub struct CycleOutcome {
    pub report: CycleReport,
    pub elapsed: Duration,
    pub error: Option<PipelineError>,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// What a handler hands back on success.
#[derive(Debug, Default)]
pub(crate) struct HandlerOutput {
    pub findings: Vec<String>,
    pub improvements: Vec<String>,
    pub next_actions: Vec<String>,
    pub metadata: Map<String, Value>,
}

/// Runs one cycle for one agent.
pub struct CycleExecutor {
    clock: Arc<dyn Clock>,
    credentials: Arc<dyn CredentialSource>,
    provider: Arc<dyn HostProvider>,
    detectors: Arc<Vec<Box<dyn Detector>>>,
    transform: Arc<dyn ContentTransform>,
    settings: ImprovementSettings,
}

impl CycleExecutor {
    pub fn new(
        clock: Arc<dyn Clock>,
        credentials: Arc<dyn CredentialSource>,
        provider: Arc<dyn HostProvider>,
        settings: ImprovementSettings,
    ) -> Self {
        Self {
            clock,
            credentials,
            provider,
            detectors: Arc::new(default_detectors()),
            transform: Arc::new(ReplaceContent),
            settings,
        }
    }

    pub fn with_detectors(mut self, detectors: Vec<Box<dyn Detector>>) -> Self {
        self.detectors = Arc::new(detectors);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ContentTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Execute cycle `agent.current_cycle + 1`.
    pub async fn run_cycle(&self, agent: &Agent) -> CycleOutcome {
        let cycle_number = agent.current_cycle + 1;
        let cycle_type = determine_cycle_type(cycle_number);
        info!("Agent {} starting cycle {} ({})", agent.id, cycle_number, cycle_type);

        let started = Instant::now();
        let result = match cycle_type {
            CycleType::ToolDiscovery => Ok(self.tool_discovery(agent)),
            CycleType::SelfAnalysis => Ok(self.self_analysis(agent)),
            CycleType::StateSave => Ok(self.state_save(agent, cycle_number)),
            CycleType::SelfImprovement => self.self_improvement(agent).await,
        };
        let elapsed = started.elapsed();

        let (status, output, error) = match result {
            Ok(output) => (ReportStatus::Completed, output, None),
            Err(e) => {
                warn!("Agent {} cycle {} failed: {}", agent.id, cycle_number, e);
                let mut output = HandlerOutput::default();
                output.findings.push(format!("Cycle failed: {e}"));
                output
                    .next_actions
                    .push("Retry on the next scheduled tick".to_string());
                output
                    .metadata
                    .insert("error".into(), Value::String(e.to_string()));
                (ReportStatus::Failed, output, Some(e))
            }
        };

        let mut metadata = output.metadata;
        metadata.insert(
            "duration_ms".into(),
            Value::from(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        );

        let report = CycleReport {
            id: ulid::Ulid::new().to_string(),
            agent_id: agent.id.clone(),
            cycle_number,
            cycle_type,
            timestamp: self.clock.now(),
            status,
            findings: output.findings,
            improvements: output.improvements,
            next_actions: output.next_actions,
            metadata,
        };

        CycleOutcome {
            report,
            elapsed,
            error,
        }
    }
}
