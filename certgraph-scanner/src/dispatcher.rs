use crate::domain::{FrontierItem, canonical_domain};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// What to do with a frontier item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Newly admitted; holds the canonical domain to resolve.
    Expand(String),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DepthExceeded,
    AlreadyVisited,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub admitted: usize,
    pub skipped_depth: usize,
    pub skipped_visited: usize,
    pub max_depth_seen: usize,
}

/// Admission control for the walk. Owned by exactly one task, so the
/// visited set and depth high-water mark need no locking.
#[derive(Debug)]
pub struct Dispatcher {
    max_depth: usize,
    visited: HashSet<String>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            visited: HashSet::new(),
            stats: DispatchStats::default(),
        }
    }

    pub fn admit(&mut self, item: &FrontierItem) -> Admission {
        if item.depth > self.max_depth {
            debug!("Max depth reached, skipping: {}", item.domain);
            self.stats.skipped_depth += 1;
            return Admission::Skip(SkipReason::DepthExceeded);
        }
        self.stats.max_depth_seen = self.stats.max_depth_seen.max(item.depth);

        let domain = canonical_domain(&item.domain);
        if self.visited.insert(domain.clone()) {
            self.stats.admitted += 1;
            Admission::Expand(domain)
        } else {
            self.stats.skipped_visited += 1;
            Admission::Skip(SkipReason::AlreadyVisited)
        }
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
