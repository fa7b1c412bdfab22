//! The four cycle handlers.

use super::{CycleExecutor, HandlerOutput};
use crate::analysis::CodeAnalyzer;
use crate::error::PipelineError;
use crate::pipeline::EnhancementPipeline;
use crate::types::{Agent, CycleType};
use serde_json::{json, Value};
use tracing::{debug, info};

const LOW_SUCCESS_RATE: f64 = 0.8;
const SLOW_CYCLE_MS: f64 = 30_000.0;

impl CycleExecutor {
    /// Inventory what this executor can do for the agent.
    pub(super) fn tool_discovery(&self, agent: &Agent) -> HandlerOutput {
        let mut out = HandlerOutput::default();

        let handlers = [
            CycleType::ToolDiscovery,
            CycleType::SelfAnalysis,
            CycleType::StateSave,
            CycleType::SelfImprovement,
        ]
        .map(|t| t.to_string());
        out.findings
            .push(format!("Cycle handlers available: {}", handlers.join(", ")));

        let detectors: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        for name in &detectors {
            out.findings.push(format!("Detector available: {name}"));
        }

        let repository_configured = !self.settings.repository.trim().is_empty();
        if repository_configured {
            out.findings
                .push(format!("Repository target: {}", self.settings.repository));
        } else {
            out.next_actions
                .push("Configure a repository target to enable self-improvement".into());
        }

        let credential_available = self
            .credentials
            .resolve(agent.credential.as_deref())
            .is_some();
        if credential_available {
            out.findings.push("Repository credential resolved".into());
        } else {
            out.next_actions.push(match &agent.credential {
                Some(name) => format!("Provide the repository credential '{name}'"),
                None => "Provide a default repository credential".into(),
            });
        }

        if repository_configured && credential_available {
            out.improvements
                .push("Self-improvement cycles can open enhancement branches".into());
        }

        out.metadata.insert("detectors".into(), json!(detectors));
        out.metadata
            .insert("repository_configured".into(), json!(repository_configured));
        out.metadata
            .insert("credential_available".into(), json!(credential_available));
        out
    }

    /// Review the agent's own counters.
    pub(super) fn self_analysis(&self, agent: &Agent) -> HandlerOutput {
        let mut out = HandlerOutput::default();
        let stats = &agent.cycle_stats;

        out.findings.push(format!(
            "{} cycle(s) completed, current cycle {}",
            stats.successful_cycles, agent.current_cycle
        ));

        match stats.success_rate() {
            Some(rate) => {
                out.findings
                    .push(format!("Success rate {:.0}%", rate * 100.0));
                if rate < LOW_SUCCESS_RATE {
                    out.improvements.push(format!(
                        "Success rate below {:.0}%; inspect recent failed reports",
                        LOW_SUCCESS_RATE * 100.0
                    ));
                    out.next_actions
                        .push("Review failed cycle reports for recurring errors".into());
                }
                out.metadata.insert("success_rate".into(), json!(rate));
            }
            None => out.findings.push("No completed cycles yet".into()),
        }

        if let Some(last) = stats.last_cycle_ms {
            out.findings.push(format!(
                "Last cycle took {} ms (average {:.1} ms)",
                last, stats.avg_cycle_ms
            ));
        }
        if stats.avg_cycle_ms > SLOW_CYCLE_MS {
            out.improvements.push(format!(
                "Average cycle time {:.0} ms exceeds {:.0} ms; narrow the analysis scope",
                stats.avg_cycle_ms, SLOW_CYCLE_MS
            ));
        }

        out.metadata
            .insert("avg_cycle_ms".into(), json!(stats.avg_cycle_ms));
        out
    }

    /// Capture a snapshot of the agent into the report.
    pub(super) fn state_save(&self, agent: &Agent, cycle_number: u64) -> HandlerOutput {
        let mut out = HandlerOutput::default();

        match serde_json::to_value(agent) {
            Ok(snapshot) => {
                out.metadata.insert("snapshot".into(), snapshot);
                out.findings.push(format!(
                    "Checkpoint captured for {} at cycle {}",
                    agent.name, cycle_number
                ));
            }
            Err(e) => out.findings.push(format!("Snapshot could not be serialized: {e}")),
        }
        out.findings.push(format!(
            "Status {}, {} successful cycle(s), last activity {}",
            agent.status,
            agent.cycle_stats.successful_cycles,
            agent.last_activity.to_rfc3339()
        ));
        out.next_actions
            .push(format!("Resume from cycle {}", cycle_number + 1));
        out
    }

    /// Analyze the target repository and open a branch per proposal.
    pub(super) async fn self_improvement(
        &self,
        agent: &Agent,
    ) -> Result<HandlerOutput, PipelineError> {
        let mut out = HandlerOutput::default();

        let repository = self.settings.repository.trim();
        if repository.is_empty() {
            out.findings
                .push("Self-improvement skipped: no repository target configured".into());
            out.next_actions
                .push("Configure a repository target to enable self-improvement".into());
            out.metadata.insert("skipped".into(), json!(true));
            return Ok(out);
        }

        let Some(token) = self.credentials.resolve(agent.credential.as_deref()) else {
            out.findings
                .push("Self-improvement skipped: no repository credential configured".into());
            out.next_actions
                .push("Provide a repository credential for this agent".into());
            out.metadata.insert("skipped".into(), json!(true));
            return Ok(out);
        };

        let mut options = self.settings.analyzer.clone();
        options.token = Some(token);

        let mut analyzer = CodeAnalyzer::new(self.provider.clone(), self.detectors.clone());
        analyzer.initialize(repository, options).await?;
        let proposals = analyzer.analyze_codebase().await?;

        out.findings
            .push(format!("Found {} enhancement proposal(s)", proposals.len()));
        for p in &proposals {
            out.findings.push(format!(
                "[{}/{}] {}",
                p.category, p.estimated_impact, p.title
            ));
        }

        let (Some(host), Some(repo), Some(base)) = (
            analyzer.host(),
            analyzer.repository().cloned(),
            analyzer.base_branch().map(str::to_string),
        ) else {
            return Err(PipelineError::Configuration(
                "analyzer session missing after initialize".into(),
            ));
        };

        let pipeline = EnhancementPipeline::new(host, repo, &base)
            .with_branch_prefix(&self.settings.branch_prefix)
            .with_transform(self.transform.clone());

        let mut branches = Vec::new();
        for proposal in &proposals {
            debug!("Agent {} applying proposal {}", agent.id, proposal.id);
            match pipeline
                .implement_enhancement(proposal, self.settings.auto_commit)
                .await
            {
                Some(branch) => {
                    out.improvements
                        .push(format!("Created branch {} for '{}'", branch, proposal.title));
                    branches.push(branch);
                }
                None => out
                    .next_actions
                    .push(format!("Proposal '{}' could not be applied", proposal.title)),
            }
        }

        if proposals.is_empty() {
            out.next_actions
                .push("No heuristic matches; revisit on the next improvement cycle".into());
        } else if self.settings.auto_commit {
            out.next_actions.push("Review the finalized enhancement branches".into());
        } else {
            out.next_actions
                .push("Review and finalize the staged enhancement branches".into());
        }

        info!(
            "Agent {} self-improvement: {} proposal(s), {} branch(es)",
            agent.id,
            proposals.len(),
            branches.len()
        );

        out.metadata
            .insert("proposals_found".into(), json!(proposals.len()));
        out.metadata.insert(
            "branches".into(),
            Value::Array(branches.into_iter().map(Value::String).collect()),
        );
        Ok(out)
    }
}
