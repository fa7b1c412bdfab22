//! In-memory agent registry.

use crate::executor::CycleOutcome;
use crate::types::{Agent, AgentSeed, AgentStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

/// Exclusive owner of agent records, keyed by id.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new idle agent. Returns the stored id, or `None` without
    /// touching the registry when the id is already taken.
    pub fn add(&mut self, seed: AgentSeed, now: DateTime<Utc>) -> Option<String> {
        if let Some(id) = &seed.id {
            if self.agents.contains_key(id) {
                return None;
            }
        }
        let agent = seed.into_agent(now);
        let id = agent.id.clone();
        debug!("Registered agent {} ({}, role {})", agent.id, agent.name, agent.role);
        self.agents.insert(id.clone(), agent);
        Some(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.agents.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// All agents ordered by id.
    pub fn list(&self) -> Vec<Agent> {
        self.agents.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn set_status(&mut self, id: &str, status: AgentStatus) -> bool {
        match self.agents.get_mut(id) {
            Some(agent) => {
                agent.status = status;
                true
            }
            None => false,
        }
    }

    pub fn set_all_status(&mut self, status: AgentStatus) {
        for agent in self.agents.values_mut() {
            agent.status = status;
        }
    }

    /// Fold a finished cycle into the agent record.
    ///
    /// Success advances `current_cycle`, the counters and `last_activity`,
    /// and returns the agent to active. Failure only marks the agent as
    /// errored; the next tick retries the same cycle number. Agents
    /// removed while their cycle was in flight are ignored.
    pub fn apply_outcome(&mut self, id: &str, outcome: &CycleOutcome, now: DateTime<Utc>) {
        let Some(agent) = self.agents.get_mut(id) else {
            debug!("Dropping outcome for removed agent {}", id);
            return;
        };

        if outcome.is_success() {
            agent.current_cycle = outcome.report.cycle_number;
            agent.cycle_stats.record_success(outcome.elapsed_ms());
            agent.last_activity = now;
            agent.status = AgentStatus::Active;
        } else {
            agent.status = AgentStatus::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::types::{CycleReport, CycleType, ReportStatus};
    use std::time::Duration;

    fn outcome(cycle_number: u64, error: Option<PipelineError>) -> CycleOutcome {
        CycleOutcome {
            report: CycleReport {
                id: "r".into(),
                agent_id: "a1".into(),
                cycle_number,
                cycle_type: CycleType::ToolDiscovery,
                timestamp: Utc::now(),
                status: if error.is_some() {
                    ReportStatus::Failed
                } else {
                    ReportStatus::Completed
                },
                findings: Vec::new(),
                improvements: Vec::new(),
                next_actions: Vec::new(),
                metadata: Default::default(),
            },
            elapsed: Duration::from_millis(40),
            error,
        }
    }

    #[test]
    fn test_add_duplicate_leaves_record_unchanged() {
        let mut reg = AgentRegistry::new();
        let now = Utc::now();
        assert!(reg.add(AgentSeed::new("a1", "Alpha", "developer"), now).is_some());
        assert!(reg.add(AgentSeed::new("a1", "Impostor", "security"), now).is_none());

        let agent = reg.get("a1").unwrap();
        assert_eq!(agent.name, "Alpha");
        assert_eq!(agent.role, "developer");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut reg = AgentRegistry::new();
        reg.add(AgentSeed::new("a1", "Alpha", "developer"), Utc::now());
        assert!(!reg.remove("nope"));
        assert!(reg.remove("a1"));
        assert!(reg.get("a1").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_list_is_ordered_by_id() {
        let mut reg = AgentRegistry::new();
        let now = Utc::now();
        reg.add(AgentSeed::new("b", "B", "x"), now);
        reg.add(AgentSeed::new("a", "A", "x"), now);
        let ids: Vec<_> = reg.list().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_apply_outcome_success_and_failure() {
        let mut reg = AgentRegistry::new();
        let start = Utc::now();
        reg.add(AgentSeed::new("a1", "Alpha", "developer"), start);

        let later = start + chrono::Duration::seconds(5);
        reg.apply_outcome("a1", &outcome(1, None), later);
        let agent = reg.get("a1").unwrap();
        assert_eq!(agent.current_cycle, 1);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.last_activity, later);
        assert_eq!(agent.cycle_stats.last_cycle_ms, Some(40));

        let even_later = later + chrono::Duration::seconds(5);
        reg.apply_outcome(
            "a1",
            &outcome(2, Some(PipelineError::Network("down".into()))),
            even_later,
        );
        let agent = reg.get("a1").unwrap();
        assert_eq!(agent.current_cycle, 1);
        assert_eq!(agent.status, AgentStatus::Error);
        assert_eq!(agent.last_activity, later);
        assert_eq!(agent.cycle_stats.total_cycles, 1);
        assert_eq!(agent.cycle_stats.successful_cycles, 1);
        assert_eq!(agent.cycle_stats.last_cycle_ms, Some(40));
    }

    #[test]
    fn test_apply_outcome_for_removed_agent_is_ignored() {
        let mut reg = AgentRegistry::new();
        reg.apply_outcome("ghost", &outcome(1, None), Utc::now());
        assert!(reg.is_empty());
    }
}
