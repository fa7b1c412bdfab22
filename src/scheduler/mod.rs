//! Periodic cycle scheduler.
//!
//! One timer task per agent fires at the agent's role interval. Each tick
//! spawns the cycle as its own task behind a per-agent guard, so a slow
//! cycle causes later ticks to be skipped rather than overlapped. `stop`
//! cancels the timers but lets cycles already in flight finish.

mod intervals;

pub use intervals::IntervalTable;

use crate::clock::SystemClock;
use crate::config::{ConfigError, CyclerConfig};
use crate::credentials::EnvCredentials;
use crate::executor::{CycleExecutor, CycleOutcome};
use crate::github::GitHubProvider;
use crate::registry::AgentRegistry;
use crate::reports::ReportStore;
use crate::types::{Agent, AgentSeed, AgentStatus, CycleReport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Shared {
    registry: RwLock<AgentRegistry>,
    reports: RwLock<ReportStore>,
    running: AtomicBool,
    timers: Mutex<Timers>,
    /// Single-flight guards. An entry is dropped once its agent is removed
    /// and no cycle holds it, so a re-added id never races a running cycle.
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    executor: CycleExecutor,
    intervals: IntervalTable,
}

#[derive(Default)]
struct Timers {
    root: CancellationToken,
    by_agent: HashMap<String, CancellationToken>,
}

/// Owns the agents, their timers and the report log.
#[derive(Clone)]
pub struct CycleScheduler {
    inner: Arc<Shared>,
}

impl CycleScheduler {
    pub fn new(executor: CycleExecutor, intervals: IntervalTable, report_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                registry: RwLock::new(AgentRegistry::new()),
                reports: RwLock::new(ReportStore::new(report_capacity)),
                running: AtomicBool::new(false),
                timers: Mutex::new(Timers::default()),
                guards: Mutex::new(HashMap::new()),
                executor,
                intervals,
            }),
        }
    }

    /// Production wiring: wall clock, environment credentials, GitHub.
    pub fn from_config(config: &CyclerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let provider = GitHubProvider::new(&config.github_api_url, config.request_timeout())
            .map_err(|e| ConfigError::InvalidField {
                field: "request_timeout_secs".into(),
                value: config.request_timeout_secs.to_string(),
                reason: e.to_string(),
            })?;
        let executor = CycleExecutor::new(
            Arc::new(SystemClock::new()),
            Arc::new(EnvCredentials::new(config.effective_token())),
            Arc::new(provider),
            config.improvement_settings(),
        );
        Ok(Self::new(
            executor,
            IntervalTable::from_config(config),
            config.report_capacity,
        ))
    }

    // ---- Lifecycle ----

    /// Arm one timer per agent. Calling this while running does nothing.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return;
        }

        let agents = {
            let mut registry = self.inner.registry.write().await;
            registry.set_all_status(AgentStatus::Active);
            registry.list()
        };

        let mut timers = self.inner.timers.lock().await;
        timers.root = CancellationToken::new();
        for agent in &agents {
            self.arm_timer(&mut timers, agent);
        }
        info!("Cycle scheduler started with {} agent(s)", agents.len());
    }

    /// Cancel every timer and idle every agent.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        {
            let mut timers = self.inner.timers.lock().await;
            timers.root.cancel();
            timers.by_agent.clear();
        }
        self.inner
            .registry
            .write()
            .await
            .set_all_status(AgentStatus::Idle);
        info!("Cycle scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // ---- Agents ----

    /// Register an agent. Returns false when the id is taken.
    pub async fn add_agent(&self, seed: AgentSeed) -> bool {
        let now = self.inner.executor.clock().now();
        let agent = {
            let mut registry = self.inner.registry.write().await;
            let Some(id) = registry.add(seed, now) else {
                return false;
            };
            if self.is_running() {
                registry.set_status(&id, AgentStatus::Active);
            }
            registry.get(&id).cloned()
        };

        if let Some(agent) = agent {
            if self.is_running() {
                let mut timers = self.inner.timers.lock().await;
                self.arm_timer(&mut timers, &agent);
            }
            info!("Added agent {} ({})", agent.id, agent.role);
        }
        true
    }

    /// Cancel the agent's timer and drop its record.
    pub async fn remove_agent(&self, id: &str) -> bool {
        if let Some(token) = self.inner.timers.lock().await.by_agent.remove(id) {
            token.cancel();
        }
        let removed = self.inner.registry.write().await.remove(id);
        if removed {
            self.prune_guard(id).await;
            info!("Removed agent {}", id);
        }
        removed
    }

    /// Register several agents, skipping duplicate ids. Returns how many
    /// were added.
    pub async fn seed(&self, seeds: impl IntoIterator<Item = AgentSeed>) -> usize {
        let mut added = 0;
        for seed in seeds {
            let label = seed.id.clone().unwrap_or_else(|| seed.name.clone());
            if self.add_agent(seed).await {
                added += 1;
            } else {
                warn!("Skipping duplicate agent id {}", label);
            }
        }
        added
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.inner.registry.read().await.list()
    }

    pub async fn get_agent(&self, id: &str) -> Option<Agent> {
        self.inner.registry.read().await.get(id).cloned()
    }

    pub fn interval_for(&self, role: &str) -> Duration {
        self.inner.intervals.interval_for(role)
    }

    // ---- Reports ----

    /// Up to `limit` reports across all agents, newest first.
    pub async fn get_recent_reports(&self, limit: usize) -> Vec<CycleReport> {
        self.inner.reports.read().await.recent(limit)
    }

    /// Up to `limit` reports for one agent, newest first.
    pub async fn get_agent_reports(&self, id: &str, limit: usize) -> Vec<CycleReport> {
        self.inner.reports.read().await.for_agent(id, limit)
    }

    // ---- Cycles ----

    /// Run the agent's next cycle now, outside the timer. Returns `None`
    /// for an unknown agent or when a cycle for it is already in flight.
    pub async fn run_cycle_now(&self, id: &str) -> Option<CycleOutcome> {
        let permit = self.try_acquire(id).await?;
        self.execute(id, permit).await
    }

    /// Number of cycles currently executing.
    pub async fn in_flight(&self) -> usize {
        self.inner
            .guards
            .lock()
            .await
            .values()
            .filter(|g| g.try_lock().is_err())
            .count()
    }

    fn arm_timer(&self, timers: &mut Timers, agent: &Agent) {
        let period = self.inner.intervals.interval_for(&agent.role);
        let token = timers.root.child_token();
        if let Some(previous) = timers.by_agent.insert(agent.id.clone(), token.clone()) {
            previous.cancel();
        }

        let scheduler = self.clone();
        let id = agent.id.clone();
        debug!("Arming timer for {} every {:?}", id, period);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Timer for {} cancelled", id);
                        return;
                    }
                    _ = ticker.tick() => scheduler.on_tick(&id).await,
                }
            }
        });
    }

    async fn on_tick(&self, id: &str) {
        if !self.is_running() {
            return;
        }
        let Some(permit) = self.try_acquire(id).await else {
            debug!("Agent {} still cycling, skipping tick", id);
            return;
        };

        let scheduler = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            scheduler.execute(&id, permit).await;
        });
    }

    async fn try_acquire(&self, id: &str) -> Option<OwnedMutexGuard<()>> {
        // locked under the map lock so pruning never sees a half-taken guard
        let mut guards = self.inner.guards.lock().await;
        guards
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
            .try_lock_owned()
            .ok()
    }

    /// Drop the guard of a removed agent unless a cycle still holds it.
    async fn prune_guard(&self, id: &str) {
        let mut guards = self.inner.guards.lock().await;
        let idle = guards.get(id).is_some_and(|g| g.try_lock().is_ok());
        if idle && self.inner.registry.read().await.get(id).is_none() {
            guards.remove(id);
            debug!("Dropped single-flight guard for {}", id);
        }
    }

    #[cfg(test)]
    async fn guard_count(&self) -> usize {
        self.inner.guards.lock().await.len()
    }

    /// Run one cycle while holding the agent's guard.
    async fn execute(&self, id: &str, permit: OwnedMutexGuard<()>) -> Option<CycleOutcome> {
        let agent = {
            let mut registry = self.inner.registry.write().await;
            if !registry.set_status(id, AgentStatus::Cycling) {
                drop(registry);
                drop(permit);
                self.prune_guard(id).await;
                return None;
            }
            registry.get(id).cloned()?
        };

        let outcome = self.inner.executor.run_cycle(&agent).await;
        let now = self.inner.executor.clock().now();

        self.inner
            .reports
            .write()
            .await
            .append(outcome.report.clone());

        let removed = {
            let mut registry = self.inner.registry.write().await;
            registry.apply_outcome(id, &outcome, now);
            // stopped while this cycle was in flight
            if !self.is_running() {
                registry.set_status(id, AgentStatus::Idle);
            }
            registry.get(id).is_none()
        };
        drop(permit);
        if removed {
            self.prune_guard(id).await;
        }

        debug!(
            "Agent {} finished cycle {} ({}) in {} ms",
            id,
            outcome.report.cycle_number,
            outcome.report.status,
            outcome.elapsed_ms()
        );
        Some(outcome)
    }
}
