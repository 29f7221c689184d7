//! Link telemetry ingestion
//!
//! Telemetry arrives as a loosely populated [`RawTelemetry`] record from a
//! [`TelemetrySource`] and is validated exactly once into a
//! [`TelemetrySample`]. Everything downstream (scoring, anomaly detection,
//! forecasting) consumes only validated samples.

mod synthetic;

pub use synthetic::SyntheticTelemetry;

use crate::models::{Link, LinkId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const DEFAULT_TEMPERATURE: f64 = 25.0;
const DEFAULT_SIGNAL_INTEGRITY: f64 = 1.0;
const MIN_TEMPERATURE: f64 = -50.0;
const MAX_TEMPERATURE: f64 = 150.0;

/// Telemetry as reported by a source, with any field possibly missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTelemetry {
    pub latency: Option<f64>,
    pub bit_error_rate: Option<f64>,
    pub utilization: Option<f64>,
    pub temperature: Option<f64>,
    pub crc_error_rate: Option<f64>,
    pub signal_integrity: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Validated per-link telemetry for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub latency: f64,
    pub bit_error_rate: f64,
    pub utilization: f64,
    pub temperature: f64,
    pub crc_error_rate: f64,
    pub signal_integrity: f64,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    /// Fill defaults for missing or non-finite fields and clamp to physical ranges
    pub fn from_raw(raw: &RawTelemetry) -> Self {
        Self {
            latency: non_negative(raw.latency),
            bit_error_rate: non_negative(raw.bit_error_rate),
            utilization: finite_or(raw.utilization, 0.0).clamp(0.0, 1.0),
            temperature: finite_or(raw.temperature, DEFAULT_TEMPERATURE)
                .clamp(MIN_TEMPERATURE, MAX_TEMPERATURE),
            crc_error_rate: non_negative(raw.crc_error_rate),
            signal_integrity: finite_or(raw.signal_integrity, DEFAULT_SIGNAL_INTEGRITY)
                .clamp(0.0, 1.0),
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Latency => self.latency,
            Metric::BitErrorRate => self.bit_error_rate,
            Metric::Utilization => self.utilization,
            Metric::Temperature => self.temperature,
            Metric::CrcErrorRate => self.crc_error_rate,
            Metric::SignalIntegrity => self.signal_integrity,
        }
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

fn non_negative(value: Option<f64>) -> f64 {
    finite_or(value, 0.0).max(0.0)
}

/// Telemetry metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Latency,
    BitErrorRate,
    Utilization,
    Temperature,
    CrcErrorRate,
    SignalIntegrity,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Latency,
        Metric::BitErrorRate,
        Metric::Utilization,
        Metric::Temperature,
        Metric::CrcErrorRate,
        Metric::SignalIntegrity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::BitErrorRate => "bit_error_rate",
            Metric::Utilization => "utilization",
            Metric::Temperature => "temperature",
            Metric::CrcErrorRate => "crc_error_rate",
            Metric::SignalIntegrity => "signal_integrity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of timed perturbation a fault registers with a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerturbationKind {
    Degradation,
    Congestion,
}

/// A timed condition a source keeps its simulated metrics consistent with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub kind: PerturbationKind,
    /// In [0,1]
    pub severity: f64,
    pub duration: Duration,
}

/// Source of per-link telemetry consumed by the control loop
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Produce one reading for the given link
    async fn collect(&self, link: &Link) -> anyhow::Result<RawTelemetry>;

    /// Register a timed perturbation on a link; it expires on its own
    fn perturb(&self, link: LinkId, perturbation: Perturbation);

    /// Drop every registered perturbation
    fn clear_perturbations(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let sample = TelemetrySample::from_raw(&RawTelemetry::default());
        assert_eq!(sample.latency, 0.0);
        assert_eq!(sample.bit_error_rate, 0.0);
        assert_eq!(sample.utilization, 0.0);
        assert_eq!(sample.temperature, 25.0);
        assert_eq!(sample.crc_error_rate, 0.0);
        assert_eq!(sample.signal_integrity, 1.0);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let raw = RawTelemetry {
            latency: Some(-4.0),
            bit_error_rate: Some(f64::NAN),
            utilization: Some(1.7),
            temperature: Some(400.0),
            crc_error_rate: Some(f64::NEG_INFINITY),
            signal_integrity: Some(-0.2),
            timestamp: None,
        };
        let sample = TelemetrySample::from_raw(&raw);
        assert_eq!(sample.latency, 0.0);
        assert_eq!(sample.bit_error_rate, 0.0);
        assert_eq!(sample.utilization, 1.0);
        assert_eq!(sample.temperature, 150.0);
        assert_eq!(sample.crc_error_rate, 0.0);
        assert_eq!(sample.signal_integrity, 0.0);
    }

    #[test]
    fn test_metric_lookup() {
        let raw = RawTelemetry {
            latency: Some(2.5),
            temperature: Some(61.0),
            ..Default::default()
        };
        let sample = TelemetrySample::from_raw(&raw);
        assert_eq!(sample.value(Metric::Latency), 2.5);
        assert_eq!(sample.value(Metric::Temperature), 61.0);
        assert_eq!(Metric::CrcErrorRate.to_string(), "crc_error_rate");
    }
}
