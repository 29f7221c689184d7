//! Fault injection for exercising the control loop
//!
//! Each [`FaultKind`] degrades static link attributes so routing reacts at
//! once, and registers timed perturbations with the telemetry source so the
//! simulated metrics agree with the injected condition until it expires.

mod injector;

pub use injector::FaultInjector;

use crate::error::{FabricError, Result};
use crate::models::LinkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Gradual loss of 30-70% of a link's health
    LinkDegradation,
    /// Complete failure of one link
    SuddenFailure,
    /// Telemetry-only degradation on up to three links
    IntermittentIssues,
    /// Utilization spike on 20-50% of links
    CongestionStorm,
    /// Degradation that weakly spreads to links sharing an endpoint
    ThermalEvent,
    /// One heavy failure followed by staggered degradations
    CascadeFailure,
}

impl FaultKind {
    pub const ALL: [FaultKind; 6] = [
        Self::LinkDegradation,
        Self::SuddenFailure,
        Self::IntermittentIssues,
        Self::CongestionStorm,
        Self::ThermalEvent,
        Self::CascadeFailure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LinkDegradation => "link_degradation",
            Self::SuddenFailure => "sudden_failure",
            Self::IntermittentIssues => "intermittent_issues",
            Self::CongestionStorm => "congestion_storm",
            Self::ThermalEvent => "thermal_event",
            Self::CascadeFailure => "cascade_failure",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FaultKind {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| FabricError::invalid(format!("unknown fault kind '{s}'")))
    }
}

/// Optional overrides for an injection; anything unset is drawn at random
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaultParams {
    pub target: Option<LinkId>,
    /// Primary severity in [0,1]
    pub severity: Option<f64>,
    pub duration: Option<Duration>,
}

impl FaultParams {
    pub fn targeting(link: LinkId) -> Self {
        Self {
            target: Some(link),
            ..Default::default()
        }
    }

    pub fn with_severity(mut self, severity: f64) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(s) = self.severity {
            if !(0.0..=1.0).contains(&s) {
                return Err(FabricError::invalid(format!(
                    "fault severity {s} outside [0,1]"
                )));
            }
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(FabricError::invalid("fault duration must be positive"));
        }
        Ok(())
    }
}

/// One link touched by a fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultTarget {
    pub link: LinkId,
    pub severity: f64,
    /// Simulated onset delay for staged faults
    pub delay_secs: u64,
}

/// Description of an injected fault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultEvent {
    pub id: u64,
    pub kind: FaultKind,
    pub targets: Vec<FaultTarget>,
    pub severity: f64,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub description: String,
}

impl FaultEvent {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(self.duration_secs as i64)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at()
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_seconds().max(0)
    }
}
