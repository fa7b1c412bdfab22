//! Bounded, append-only log of cycle reports.

use crate::types::CycleReport;
use std::collections::VecDeque;

/// Default and maximum number of reports retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Keeps the most recent `capacity` reports (at most 100); older ones fall
/// off the front.
#[derive(Debug)]
pub struct ReportStore {
    reports: VecDeque<CycleReport>,
    capacity: usize,
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReportStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, DEFAULT_CAPACITY);
        Self {
            reports: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, report: CycleReport) {
        if self.reports.len() == self.capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }

    /// Up to `limit` reports, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CycleReport> {
        self.newest_first(limit, |_| true)
    }

    /// Up to `limit` reports of one agent, newest first.
    pub fn for_agent(&self, agent_id: &str, limit: usize) -> Vec<CycleReport> {
        self.newest_first(limit, |r| r.agent_id == agent_id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn newest_first(&self, limit: usize, keep: impl Fn(&CycleReport) -> bool) -> Vec<CycleReport> {
        // completion order across agents is not timestamp order, so sort
        let mut out: Vec<(usize, &CycleReport)> =
            self.reports.iter().enumerate().filter(|(_, r)| keep(r)).collect();
        out.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));
        out.into_iter().take(limit).map(|(_, r)| r.clone()).collect()
    }
}
