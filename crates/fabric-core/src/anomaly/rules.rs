//! Fixed-threshold anomaly rules

use crate::telemetry::TelemetrySample;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_LATENCY: f64 = 100.0;
const MAX_BIT_ERROR_RATE: f64 = 1e-9;
const MAX_UTILIZATION: f64 = 0.95;
const TEMPERATURE_RANGE: (f64, f64) = (10.0, 85.0);
const MAX_CRC_ERROR_RATE: f64 = 100.0;
/// High latency on a nearly idle link points at a stuck or misrouted link
const STUCK_LATENCY: f64 = 50.0;
const STUCK_UTILIZATION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleViolation {
    ExcessiveLatency { latency: f64 },
    HighBitErrorRate { bit_error_rate: f64 },
    Overutilized { utilization: f64 },
    TemperatureOutOfRange { temperature: f64 },
    ExcessiveCrcErrors { crc_error_rate: f64 },
    StuckLink { latency: f64, utilization: f64 },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExcessiveLatency { latency } => write!(f, "latency {latency:.2} above {MAX_LATENCY}"),
            Self::HighBitErrorRate { bit_error_rate } => {
                write!(f, "bit error rate {bit_error_rate:.2e} above {MAX_BIT_ERROR_RATE:e}")
            }
            Self::Overutilized { utilization } => {
                write!(f, "utilization {:.1}% above {:.0}%", utilization * 100.0, MAX_UTILIZATION * 100.0)
            }
            Self::TemperatureOutOfRange { temperature } => write!(
                f,
                "temperature {temperature:.1} outside {}..{}",
                TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
            ),
            Self::ExcessiveCrcErrors { crc_error_rate } => {
                write!(f, "CRC error rate {crc_error_rate:.1} above {MAX_CRC_ERROR_RATE}")
            }
            Self::StuckLink {
                latency,
                utilization,
            } => write!(
                f,
                "latency {latency:.2} with utilization {:.1}% suggests a stuck link",
                utilization * 100.0
            ),
        }
    }
}

/// Every rule the sample violates
pub fn evaluate(sample: &TelemetrySample) -> Vec<RuleViolation> {
    let mut out = Vec::new();
    if sample.latency > MAX_LATENCY {
        out.push(RuleViolation::ExcessiveLatency {
            latency: sample.latency,
        });
    }
    if sample.bit_error_rate > MAX_BIT_ERROR_RATE {
        out.push(RuleViolation::HighBitErrorRate {
            bit_error_rate: sample.bit_error_rate,
        });
    }
    if sample.utilization > MAX_UTILIZATION {
        out.push(RuleViolation::Overutilized {
            utilization: sample.utilization,
        });
    }
    if sample.temperature > TEMPERATURE_RANGE.1 || sample.temperature < TEMPERATURE_RANGE.0 {
        out.push(RuleViolation::TemperatureOutOfRange {
            temperature: sample.temperature,
        });
    }
    if sample.crc_error_rate > MAX_CRC_ERROR_RATE {
        out.push(RuleViolation::ExcessiveCrcErrors {
            crc_error_rate: sample.crc_error_rate,
        });
    }
    if sample.latency > STUCK_LATENCY && sample.utilization < STUCK_UTILIZATION {
        out.push(RuleViolation::StuckLink {
            latency: sample.latency,
            utilization: sample.utilization,
        });
    }
    out
}
