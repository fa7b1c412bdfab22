//! Role to tick-interval lookup.

use crate::config::CyclerConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Shortest period a timer is armed with; tokio rejects a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tick interval per role, case-insensitive, with a fallback.
#[derive(Debug, Clone)]
pub struct IntervalTable {
    fallback: Duration,
    by_role: HashMap<String, Duration>,
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self::from_config(&CyclerConfig::default())
    }
}

impl IntervalTable {
    /// Empty table; every role gets `fallback`.
    pub fn new(fallback: Duration) -> Self {
        Self {
            fallback,
            by_role: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: &str, period: Duration) -> Self {
        self.by_role.insert(normalize(role), period);
        self
    }

    pub fn from_config(config: &CyclerConfig) -> Self {
        config.role_intervals.iter().fold(
            Self::new(Duration::from_secs(config.default_interval_secs)),
            |table, (role, secs)| table.with_role(role, Duration::from_secs(*secs)),
        )
    }

    pub fn interval_for(&self, role: &str) -> Duration {
        self.by_role
            .get(&normalize(role))
            .copied()
            .unwrap_or(self.fallback)
            .max(MIN_PERIOD)
    }

    pub fn fallback(&self) -> Duration {
        self.fallback
    }
}

fn normalize(role: &str) -> String {
    role.trim().to_lowercase()
}
