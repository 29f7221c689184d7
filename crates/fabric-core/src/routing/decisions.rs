use super::RouteMetrics;
use crate::journal::{BoundedLog, Timestamped};
use crate::models::{JobId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decisions retained before the oldest is evicted
pub const DECISION_CAPACITY: usize = 100;
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Record of one job being moved to a new route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub old_route: Vec<NodeId>,
    pub new_route: Vec<NodeId>,
    pub reason: String,
    pub metrics_before: RouteMetrics,
    pub metrics_after: RouteMetrics,
}

impl Timestamped for RoutingDecision {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug)]
pub struct DecisionLog {
    log: BoundedLog<RoutingDecision>,
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new(DECISION_CAPACITY)
    }
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: BoundedLog::new(capacity),
        }
    }

    pub fn push(&self, decision: RoutingDecision) {
        self.log.push(decision);
    }

    /// Decisions within `window`, most recent first. A limit outside
    /// 1..=1000 falls back to 100.
    pub fn query(&self, window: Option<Duration>, limit: usize) -> Vec<RoutingDecision> {
        let limit = if (1..=MAX_LIMIT).contains(&limit) {
            limit
        } else {
            DEFAULT_LIMIT
        };
        self.log.recent(window, limit, |_| true)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn clear(&self) {
        self.log.clear();
    }
}
