//! Rolling per-metric baselines and z-score deviation checks

use super::AnomalySeverity;
use crate::telemetry::{Metric, TelemetrySample};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Samples retained per metric baseline
pub const BASELINE_WINDOW: usize = 100;
/// Baselines start judging once they hold this many samples
const MIN_SAMPLES_FOR_DETECTION: usize = 6;
const MIN_STD_DEV: f64 = 0.001;

/// Metrics tracked by baselines, with their z-score thresholds
const THRESHOLDS: [(Metric, f64); 5] = [
    (Metric::Latency, 3.0),
    (Metric::BitErrorRate, 2.5),
    (Metric::Utilization, 2.0),
    (Metric::Temperature, 2.5),
    (Metric::CrcErrorRate, 2.0),
];

pub fn zscore_threshold(metric: Metric) -> Option<f64> {
    THRESHOLDS.iter().find(|(m, _)| *m == metric).map(|(_, t)| *t)
}

/// Mean and standard deviation over the last `BASELINE_WINDOW` samples
#[derive(Debug, Clone)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            mean: 0.0,
            std_dev: 1.0,
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn add_sample(&mut self, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.recalculate_stats();
    }

    fn recalculate_stats(&mut self) {
        if !self.has_sufficient_data() {
            return;
        }
        let values: Vec<f64> = self.samples.iter().copied().collect();
        self.mean = crate::stats::mean(&values);
        self.std_dev = crate::stats::std_dev(&values).max(MIN_STD_DEV);
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn has_sufficient_data(&self) -> bool {
        self.samples.len() >= MIN_SAMPLES_FOR_DETECTION
    }

    /// Absolute z-score of `value`, once enough samples exist
    pub fn z_score(&self, value: f64) -> Option<f64> {
        self.has_sufficient_data()
            .then(|| (value - self.mean).abs() / self.std_dev)
    }
}

impl Default for RollingStats {
    fn default() -> Self {
        Self::new(BASELINE_WINDOW)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

/// A metric outside its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub metric: Metric,
    pub current_value: f64,
    pub baseline_mean: f64,
    pub z_score: f64,
    pub direction: Direction,
    pub severity: AnomalySeverity,
}

impl Deviation {
    pub fn severity_for(z_score: f64) -> AnomalySeverity {
        if z_score > 4.0 {
            AnomalySeverity::Critical
        } else if z_score > 3.0 {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        }
    }
}

/// Baselines for every tracked metric of one link
#[derive(Debug, Clone)]
pub struct LinkBaselines {
    stats: Vec<(Metric, RollingStats)>,
}

impl Default for LinkBaselines {
    fn default() -> Self {
        Self::new(BASELINE_WINDOW)
    }
}

impl LinkBaselines {
    pub fn new(window: usize) -> Self {
        Self {
            stats: THRESHOLDS
                .iter()
                .map(|(m, _)| (*m, RollingStats::new(window)))
                .collect(),
        }
    }

    pub fn update(&mut self, sample: &TelemetrySample) {
        for (metric, stats) in &mut self.stats {
            stats.add_sample(sample.value(*metric));
        }
    }

    /// Metrics whose z-score exceeds their threshold, largest deviation first
    pub fn deviations(&self, sample: &TelemetrySample) -> Vec<Deviation> {
        let mut out: Vec<Deviation> = self
            .stats
            .iter()
            .filter_map(|(metric, stats)| {
                let value = sample.value(*metric);
                let z = stats.z_score(value)?;
                let threshold = zscore_threshold(*metric)?;
                (z > threshold).then(|| Deviation {
                    metric: *metric,
                    current_value: value,
                    baseline_mean: stats.mean,
                    z_score: z,
                    direction: if value > stats.mean {
                        Direction::High
                    } else {
                        Direction::Low
                    },
                    severity: Deviation::severity_for(z),
                })
            })
            .collect();
        out.sort_by(|a, b| b.z_score.total_cmp(&a.z_score));
        out
    }

    pub fn stats(&self, metric: Metric) -> Option<&RollingStats> {
        self.stats.iter().find(|(m, _)| *m == metric).map(|(_, s)| s)
    }
}
