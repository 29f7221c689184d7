use crate::models::LinkId;
use crate::scoring::HealthResult;
use crate::telemetry::TelemetrySample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Processed state of one link in a tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub telemetry: TelemetrySample,
    pub health: HealthResult,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
}

/// Immutable per-link view published once per tick.
///
/// Readers hold an `Arc` to a complete snapshot; a new tick builds a fresh
/// one and swaps it in whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    /// Tick that produced the snapshot; 0 before the first tick of a generation
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub links: BTreeMap<LinkId, LinkSnapshot>,
    /// Links that failed to report this tick
    pub failed_links: Vec<LinkId>,
}

impl Snapshot {
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            tick: 0,
            timestamp: Utc::now(),
            links: BTreeMap::new(),
            failed_links: Vec::new(),
        }
    }

    pub fn link(&self, id: &LinkId) -> Option<&LinkSnapshot> {
        self.links.get(id)
    }

    pub fn average_health(&self) -> Option<f64> {
        if self.links.is_empty() {
            return None;
        }
        let total: f64 = self.links.values().map(|l| l.health.overall_score).sum();
        Some(total / self.links.len() as f64)
    }

    pub fn anomaly_count(&self) -> usize {
        self.links.values().filter(|l| l.is_anomaly).count()
    }
}

/// Outcome counts of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub links_scored: usize,
    pub link_errors: usize,
    pub anomalies: usize,
    pub alerts: usize,
    pub jobs_evaluated: usize,
    pub reroutes: usize,
}
