//! Isolation-forest outlier model
//!
//! Points that are isolated by few random axis-aligned splits are outliers.
//! The model is fitted on standardized features from a rolling buffer and
//! refreshed after a configurable number of new observations.

use crate::telemetry::TelemetrySample;
use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub const FEATURE_COUNT: usize = 10;
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Shortest interval used for rate-of-change features, in seconds
const MIN_RATE_INTERVAL_SECS: f64 = 0.1;

/// Raw metrics, two load ratios, temperature offset and two rates of change
pub fn extract_features(sample: &TelemetrySample, previous: Option<&TelemetrySample>) -> FeatureVector {
    let (latency_rate, utilization_rate) = match previous {
        Some(prev) => {
            let elapsed = (sample.timestamp - prev.timestamp)
                .num_milliseconds() as f64
                / 1000.0;
            let dt = elapsed.max(MIN_RATE_INTERVAL_SECS);
            (
                (sample.latency - prev.latency) / dt,
                (sample.utilization - prev.utilization) / dt,
            )
        }
        None => (0.0, 0.0),
    };
    [
        sample.latency,
        sample.bit_error_rate,
        sample.utilization,
        sample.temperature,
        sample.crc_error_rate,
        sample.latency * sample.utilization,
        sample.bit_error_rate / sample.utilization.max(0.001),
        sample.temperature - 20.0,
        latency_rate,
        utilization_rate,
    ]
}

#[derive(Debug, Clone)]
pub struct OutlierConfig {
    pub trees: usize,
    pub subsample: usize,
    /// Expected share of outliers in the training buffer
    pub contamination: f64,
    pub buffer_capacity: usize,
    pub min_samples: usize,
    /// New observations between refits
    pub retrain_interval: usize,
    pub seed: u64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            subsample: 256,
            contamination: 0.1,
            buffer_capacity: 1000,
            min_samples: 20,
            retrain_interval: 100,
            seed: 42,
        }
    }
}

/// Classification of one feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierVerdict {
    pub is_outlier: bool,
    /// In [0,1]; above 0.5 exactly when `is_outlier`
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
struct Scaler {
    mean: FeatureVector,
    std: FeatureVector,
}

impl Scaler {
    fn fit(rows: &[FeatureVector]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut std = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        for row in rows {
            for i in 0..FEATURE_COUNT {
                std[i] += (row[i] - mean[i]).powi(2) / n;
            }
        }
        for s in &mut std {
            *s = s.sqrt();
            if !s.is_finite() || *s < f64::EPSILON {
                *s = 1.0;
            }
        }
        Self { mean, std }
    }

    fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let z = (row[i] - self.mean[i]) / self.std[i];
            out[i] = if z.is_finite() { z } else { 0.0 };
        }
        out
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(rows: &[FeatureVector], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }
        // only split on features that vary within this partition
        let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                    (lo.min(r[f]), hi.max(r[f]))
                });
                (hi - lo > f64::EPSILON).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return Node::Leaf { size: rows.len() };
        }
        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) =
            rows.iter().copied().partition(|r| r[feature] < threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(&left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, row: &FeatureVector, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    left.path_length(row, depth + 1)
                } else {
                    right.path_length(row, depth + 1)
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful search in a binary search tree of `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + 0.577_215_664_901_532_9) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug)]
struct FittedForest {
    scaler: Scaler,
    trees: Vec<Node>,
    normalizer: f64,
    /// Isolation score above which a point is an outlier
    threshold: f64,
}

impl FittedForest {
    /// Isolation score in (0,1]; higher is more anomalous
    fn isolation_score(&self, row: &FeatureVector) -> f64 {
        let scaled = self.scaler.transform(row);
        let mean_path = self
            .trees
            .iter()
            .map(|t| t.path_length(&scaled, 0))
            .sum::<f64>()
            / self.trees.len().max(1) as f64;
        if self.normalizer <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / self.normalizer)
    }
}

/// Fleet-wide outlier model with its rolling training buffer
#[derive(Debug)]
pub struct OutlierModel {
    config: OutlierConfig,
    buffer: VecDeque<FeatureVector>,
    forest: Option<FittedForest>,
    since_fit: usize,
    rng: StdRng,
}

impl OutlierModel {
    pub fn new(config: OutlierConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            buffer: VecDeque::with_capacity(config.buffer_capacity),
            forest: None,
            since_fit: 0,
            rng,
            config,
        }
    }

    /// Record a feature vector and classify it. `None` until enough data exists to fit.
    pub fn observe(&mut self, features: FeatureVector) -> Option<OutlierVerdict> {
        if self.buffer.len() >= self.config.buffer_capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(features);
        self.since_fit += 1;

        if self.buffer.len() < self.config.min_samples {
            return None;
        }
        if self.forest.is_none() || self.since_fit >= self.config.retrain_interval.max(1) {
            self.fit();
        }
        self.classify(&features)
    }

    pub fn classify(&self, features: &FeatureVector) -> Option<OutlierVerdict> {
        let forest = self.forest.as_ref()?;
        let margin = forest.isolation_score(features) - forest.threshold;
        Some(OutlierVerdict {
            is_outlier: margin > 0.0,
            score: (0.5 + margin).clamp(0.0, 1.0),
        })
    }

    pub fn is_fitted(&self) -> bool {
        self.forest.is_some()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn fit(&mut self) {
        let rows: Vec<FeatureVector> = self.buffer.iter().copied().collect();
        let scaler = Scaler::fit(&rows);
        let scaled: Vec<FeatureVector> = rows.iter().map(|r| scaler.transform(r)).collect();

        let subsample = self.config.subsample.min(scaled.len()).max(2);
        let max_depth = (subsample as f64).log2().ceil() as usize;
        let trees: Vec<Node> = (0..self.config.trees.max(1))
            .map(|_| {
                let amount = subsample.min(scaled.len());
                let picked: Vec<FeatureVector> = sample_indices(&mut self.rng, scaled.len(), amount)
                    .into_iter()
                    .map(|i| scaled[i])
                    .collect();
                Node::build(&picked, 0, max_depth, &mut self.rng)
            })
            .collect();

        let mut forest = FittedForest {
            scaler,
            trees,
            normalizer: average_path_length(subsample),
            threshold: 0.5,
        };
        let mut training_scores: Vec<f64> = rows.iter().map(|r| forest.isolation_score(r)).collect();
        training_scores.sort_by(f64::total_cmp);
        let quantile = (1.0 - self.config.contamination.clamp(0.0, 0.5)) * (training_scores.len() - 1) as f64;
        forest.threshold = training_scores[quantile.round() as usize];

        self.forest = Some(forest);
        self.since_fit = 0;
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.forest = None;
        self.since_fit = 0;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }
}
