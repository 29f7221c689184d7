//! Alert creation and the bounded alert log

use super::AnomalyExplanation;
use crate::journal::{BoundedLog, Timestamped};
use crate::models::LinkId;
use crate::telemetry::TelemetrySample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Alerts retained before the oldest is evicted
pub const ALERT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Severity follows the link's health at the time of the anomaly
    pub fn from_health(health_score: f64) -> Self {
        if health_score < 0.3 {
            AlertSeverity::Critical
        } else if health_score < 0.7 {
            AlertSeverity::Warning
        } else {
            AlertSeverity::Info
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = crate::error::FabricError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(crate::error::FabricError::invalid(format!(
                "unknown alert severity '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub link_id: LinkId,
    pub severity: AlertSeverity,
    pub health_score: f64,
    pub message: String,
    pub explanation: AnomalyExplanation,
}

impl Alert {
    pub fn new(
        link_id: LinkId,
        sample: &TelemetrySample,
        health_score: f64,
        explanation: AnomalyExplanation,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            link_id,
            severity: AlertSeverity::from_health(health_score),
            health_score,
            message: format!(
                "Anomaly detected on {link_id}: latency={:.2}, utilization={:.1}%, health={health_score:.2} ({})",
                sample.latency,
                sample.utilization * 100.0,
                explanation.summary()
            ),
            explanation,
        }
    }
}

impl Timestamped for Alert {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Most recent alerts, capped at [`ALERT_CAPACITY`] by default
#[derive(Debug)]
pub struct AlertLog {
    log: BoundedLog<Alert>,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(ALERT_CAPACITY)
    }
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: BoundedLog::new(capacity),
        }
    }

    pub fn push(&self, alert: Alert) {
        self.log.push(alert);
    }

    /// Alerts within `window`, optionally restricted to one severity, most recent first
    pub fn query(&self, window: Option<Duration>, severity: Option<AlertSeverity>) -> Vec<Alert> {
        self.log.recent(window, usize::MAX, |a| {
            severity.map_or(true, |s| a.severity == s)
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalySeverity;
    use crate::models::NodeId;
    use crate::telemetry::RawTelemetry;

    fn explanation() -> AnomalyExplanation {
        AnomalyExplanation {
            severity: AnomalySeverity::Normal,
            deviations: vec![],
            rule_violations: vec![],
            anomaly_score: 0.7,
        }
    }

    fn alert(i: u32, health: f64) -> Alert {
        let sample = TelemetrySample::from_raw(&RawTelemetry {
            latency: Some(12.0),
            utilization: Some(0.5),
            ..Default::default()
        });
        Alert::new(
            LinkId::new(NodeId::compute(i), NodeId::switch(0)),
            &sample,
            health,
            explanation(),
        )
    }

    #[test]
    fn test_severity_from_health() {
        assert_eq!(AlertSeverity::from_health(0.1), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::from_health(0.5), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from_health(0.9), AlertSeverity::Info);
        assert_eq!("Warning".parse::<AlertSeverity>().unwrap(), AlertSeverity::Warning);
        assert!("loud".parse::<AlertSeverity>().is_err());
    }

    #[test]
    fn test_log_never_exceeds_capacity() {
        let log = AlertLog::default();
        for i in 0..51 {
            log.push(alert(i, 0.5));
        }
        assert_eq!(log.len(), ALERT_CAPACITY);
        let all = log.query(None, None);
        assert_eq!(all[0].link_id, LinkId::new(NodeId::compute(50), NodeId::switch(0)));
        assert!(all
            .iter()
            .all(|a| a.link_id != LinkId::new(NodeId::compute(0), NodeId::switch(0))));
    }

    #[test]
    fn test_query_filters_severity() {
        let log = AlertLog::default();
        log.push(alert(0, 0.1));
        log.push(alert(1, 0.5));
        log.push(alert(2, 0.2));
        let critical = log.query(None, Some(AlertSeverity::Critical));
        assert_eq!(critical.len(), 2);
        assert!(critical[0].message.contains("C2-S0"));
    }
}
