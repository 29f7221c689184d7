//! Anomaly detection for link telemetry
//!
//! Three independent detectors, OR-combined:
//! - z-score deviation from per-link rolling baselines
//! - fixed-threshold rules
//! - a fleet-wide isolation-forest outlier model
//!
//! Anomalous samples become [`Alert`]s in a bounded [`AlertLog`].

mod alerter;
mod isolation;
mod rules;
mod zscore;

pub use alerter::{Alert, AlertLog, AlertSeverity, ALERT_CAPACITY};
pub use isolation::{extract_features, FeatureVector, OutlierConfig, OutlierModel, OutlierVerdict};
pub use rules::RuleViolation;
pub use zscore::{zscore_threshold, Deviation, Direction, LinkBaselines, RollingStats};

use crate::models::LinkId;
use crate::telemetry::TelemetrySample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Normal,
    Medium,
    High,
    Critical,
}

/// Why a sample was judged anomalous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyExplanation {
    /// Highest severity among the deviations, `Normal` when none
    pub severity: AnomalySeverity,
    /// Baseline deviations, largest z-score first
    pub deviations: Vec<Deviation>,
    pub rule_violations: Vec<RuleViolation>,
    pub anomaly_score: f64,
}

impl AnomalyExplanation {
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .deviations
            .iter()
            .map(|d| format!("{} z={:.2}", d.metric, d.z_score))
            .collect();
        parts.extend(self.rule_violations.iter().map(|r| r.to_string()));
        if parts.is_empty() {
            format!("outlier score {:.2}", self.anomaly_score)
        } else {
            parts.join("; ")
        }
    }
}

/// Outcome of running every detector over one sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub link_id: LinkId,
    pub is_anomaly: bool,
    pub zscore_anomaly: bool,
    pub rule_anomaly: bool,
    pub outlier_anomaly: bool,
    /// Continuous outlier score in [0,1], 0.5 at the decision boundary; 0 before the model is fitted
    pub anomaly_score: f64,
    pub explanation: AnomalyExplanation,
}

#[derive(Debug)]
struct DetectorState {
    baselines: HashMap<LinkId, LinkBaselines>,
    previous: HashMap<LinkId, TelemetrySample>,
    outliers: OutlierModel,
}

/// Ensemble detector. Baselines and rate features are kept per link; the
/// outlier model is shared by the whole fleet.
#[derive(Debug)]
pub struct AnomalyDetector {
    state: Mutex<DetectorState>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(OutlierConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(outlier_config: OutlierConfig) -> Self {
        Self {
            state: Mutex::new(DetectorState {
                baselines: HashMap::new(),
                previous: HashMap::new(),
                outliers: OutlierModel::new(outlier_config),
            }),
        }
    }

    /// Update the link's baselines with the sample, then judge it
    pub fn detect(&self, link_id: LinkId, sample: &TelemetrySample) -> AnomalyReport {
        let mut state = self.state.lock();

        let baselines = state.baselines.entry(link_id).or_default();
        baselines.update(sample);
        let deviations = baselines.deviations(sample);

        let rule_violations = rules::evaluate(sample);

        let features = extract_features(sample, state.previous.get(&link_id));
        state.previous.insert(link_id, sample.clone());
        let verdict = state.outliers.observe(features);
        drop(state);

        let outlier_anomaly = verdict.map(|v| v.is_outlier).unwrap_or(false);
        let anomaly_score = verdict.map(|v| v.score).unwrap_or(0.0);
        let severity = deviations
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or(AnomalySeverity::Normal);
        let zscore_anomaly = !deviations.is_empty();
        let rule_anomaly = !rule_violations.is_empty();

        AnomalyReport {
            link_id,
            is_anomaly: zscore_anomaly || rule_anomaly || outlier_anomaly,
            zscore_anomaly,
            rule_anomaly,
            outlier_anomaly,
            anomaly_score,
            explanation: AnomalyExplanation {
                severity,
                deviations,
                rule_violations,
                anomaly_score,
            },
        }
    }

    /// Forget every baseline and the outlier model
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.baselines.clear();
        state.previous.clear();
        state.outliers.reset();
    }

    pub fn is_outlier_model_fitted(&self) -> bool {
        self.state.lock().outliers.is_fitted()
    }
}
