//! Link health scoring
//!
//! Turns a validated telemetry sample into a weighted [0,1] score, adjusted
//! by the short-term trend of the link's recent scores.

mod curves;

pub use curves::{score_metric, utilization_score, BandCurve};

use crate::models::LinkId;
use crate::stats::LinearFit;
use crate::telemetry::{Metric, TelemetrySample};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Per-link score history length
pub const HISTORY_CAPACITY: usize = 100;
/// History points considered by the trend factor
const TREND_WINDOW: usize = 10;
const TREND_MIN_POINTS: usize = 3;
const TREND_GAIN: f64 = 2.0;
const TREND_BOUNDS: (f64, f64) = (0.9, 1.1);
/// Sub-scores below this produce a recommendation
const RECOMMENDATION_THRESHOLD: f64 = 0.6;

/// Fixed convex weights of the overall score
pub fn metric_weight(metric: Metric) -> f64 {
    match metric {
        Metric::Latency => 0.25,
        Metric::BitErrorRate => 0.20,
        Metric::Utilization => 0.15,
        Metric::Temperature => 0.15,
        Metric::CrcErrorRate => 0.15,
        Metric::SignalIntegrity => 0.10,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthCategory {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthCategory {
    pub const ALL: [HealthCategory; 5] = [
        Self::Excellent,
        Self::Good,
        Self::Fair,
        Self::Poor,
        Self::Critical,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Excellent
        } else if score >= 0.7 {
            Self::Good
        } else if score >= 0.5 {
            Self::Fair
        } else if score >= 0.3 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

/// Sub-score per metric, each in [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    pub latency: f64,
    pub bit_error_rate: f64,
    pub utilization: f64,
    pub temperature: f64,
    pub crc_error_rate: f64,
    pub signal_integrity: f64,
}

impl MetricScores {
    pub fn from_sample(sample: &TelemetrySample) -> Self {
        let s = |m| score_metric(m, sample.value(m));
        Self {
            latency: s(Metric::Latency),
            bit_error_rate: s(Metric::BitErrorRate),
            utilization: s(Metric::Utilization),
            temperature: s(Metric::Temperature),
            crc_error_rate: s(Metric::CrcErrorRate),
            signal_integrity: s(Metric::SignalIntegrity),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Latency => self.latency,
            Metric::BitErrorRate => self.bit_error_rate,
            Metric::Utilization => self.utilization,
            Metric::Temperature => self.temperature,
            Metric::CrcErrorRate => self.crc_error_rate,
            Metric::SignalIntegrity => self.signal_integrity,
        }
    }

    pub fn weighted(&self) -> f64 {
        Metric::ALL
            .iter()
            .map(|m| self.get(*m) * metric_weight(*m))
            .sum()
    }

    /// Unweighted mean, used for the overall maintenance recommendation
    pub fn mean(&self) -> f64 {
        Metric::ALL.iter().map(|m| self.get(*m)).sum::<f64>() / Metric::ALL.len() as f64
    }
}

/// Scored health of one link for one sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub link_id: LinkId,
    pub overall_score: f64,
    pub category: HealthCategory,
    pub metric_scores: MetricScores,
    pub trend_factor: f64,
    pub timestamp: DateTime<Utc>,
    pub recommendations: Vec<String>,
}

/// Distribution of the latest score of every scored link
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_links: usize,
    pub distribution: HashMap<HealthCategory, usize>,
    pub average_health: f64,
    pub min_health: f64,
    pub max_health: f64,
    /// Share of links rated Excellent or Good, in percent
    pub healthy_percentage: f64,
}

/// Stateful scorer keeping a bounded score history per link
#[derive(Debug, Default)]
pub struct HealthScorer {
    history: Mutex<HashMap<LinkId, VecDeque<f64>>>,
}

impl HealthScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score a sample and append the result to the link's history
    pub fn score(&self, link_id: LinkId, sample: &TelemetrySample) -> HealthResult {
        let metric_scores = MetricScores::from_sample(sample);
        let base = metric_scores.weighted();

        let mut history = self.history.lock();
        let scores = history.entry(link_id).or_default();
        let trend_factor = trend_factor(scores);
        let overall_score = (base * trend_factor).clamp(0.0, 1.0);

        scores.push_back(overall_score);
        while scores.len() > HISTORY_CAPACITY {
            scores.pop_front();
        }
        drop(history);

        HealthResult {
            link_id,
            overall_score,
            category: HealthCategory::from_score(overall_score),
            metric_scores,
            trend_factor,
            timestamp: sample.timestamp,
            recommendations: recommendations(&metric_scores, sample),
        }
    }

    pub fn history(&self, link_id: &LinkId) -> Vec<f64> {
        self.history
            .lock()
            .get(link_id)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, link_id: &LinkId) -> Option<f64> {
        self.history.lock().get(link_id).and_then(|h| h.back().copied())
    }

    pub fn fleet_summary(&self) -> FleetSummary {
        let history = self.history.lock();
        let latest: Vec<f64> = history.values().filter_map(|h| h.back().copied()).collect();
        drop(history);
        if latest.is_empty() {
            return FleetSummary::default();
        }

        let mut distribution: HashMap<HealthCategory, usize> =
            HealthCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for score in &latest {
            *distribution.entry(HealthCategory::from_score(*score)).or_insert(0) += 1;
        }
        let healthy = distribution[&HealthCategory::Excellent] + distribution[&HealthCategory::Good];

        FleetSummary {
            total_links: latest.len(),
            average_health: crate::stats::mean(&latest),
            min_health: latest.iter().copied().fold(f64::INFINITY, f64::min),
            max_health: latest.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            healthy_percentage: healthy as f64 / latest.len() as f64 * 100.0,
            distribution,
        }
    }

    /// Drop all history, e.g. after a topology rebuild
    pub fn clear(&self) {
        self.history.lock().clear();
    }
}

/// Multiplier in [0.9, 1.1] from the OLS slope of the last scores
fn trend_factor(history: &VecDeque<f64>) -> f64 {
    if history.len() < TREND_MIN_POINTS {
        return 1.0;
    }
    let skip = history.len().saturating_sub(TREND_WINDOW);
    let recent: Vec<f64> = history.iter().skip(skip).copied().collect();
    let slope = LinearFit::fit(&recent).map(|f| f.slope).unwrap_or(0.0);
    (1.0 + slope * TREND_GAIN).clamp(TREND_BOUNDS.0, TREND_BOUNDS.1)
}

fn recommendations(scores: &MetricScores, sample: &TelemetrySample) -> Vec<String> {
    let mut out = Vec::new();
    let low = |m: Metric| scores.get(m) < RECOMMENDATION_THRESHOLD;

    if low(Metric::Latency) {
        out.push(format!(
            "High latency ({:.2}). Reduce traffic load or check for congestion.",
            sample.latency
        ));
    }
    if low(Metric::BitErrorRate) {
        out.push("High bit error rate. Check signal integrity and cable connections.".to_string());
    }
    if low(Metric::Utilization) {
        if sample.utilization > 0.9 {
            out.push(format!(
                "Link overutilized ({:.1}%). Rebalance load or shape traffic.",
                sample.utilization * 100.0
            ));
        } else if sample.utilization < 0.1 {
            out.push("Link underutilized. May indicate a connectivity or configuration issue.".to_string());
        }
    }
    if low(Metric::Temperature) {
        out.push(format!(
            "High temperature ({:.1}C). Check cooling and airflow.",
            sample.temperature
        ));
    }
    if low(Metric::CrcErrorRate) {
        out.push(format!(
            "High CRC error rate ({:.1}/s). Data integrity is at risk.",
            sample.crc_error_rate
        ));
    }
    if low(Metric::SignalIntegrity) {
        out.push("Poor signal integrity. Check physical connections and cable quality.".to_string());
    }

    let mean = scores.mean();
    if mean < 0.5 {
        out.push("Link requires immediate attention. Consider taking it offline for maintenance.".to_string());
    } else if mean < 0.7 {
        out.push("Schedule preventive maintenance in the next window.".to_string());
    }
    out
}
