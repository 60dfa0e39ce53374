use crate::dispatcher::DispatchStats;
use crate::domain::DomainGraph;
use crate::error::FailureKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalkStats {
    #[serde(flatten)]
    pub dispatch: DispatchStats,
    pub failures: BTreeMap<FailureKind, usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl WalkStats {
    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }
}

/// A finished walk: the committed graph plus what it took to build it.
#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub graph: DomainGraph,
    pub stats: WalkStats,
}

impl WalkResult {
    pub fn new(graph: DomainGraph, stats: WalkStats) -> Self {
        Self { graph, stats }
    }
}
