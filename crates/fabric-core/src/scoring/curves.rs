//! Per-metric scoring curves
//!
//! Each metric maps onto [0,1] through four thresholds (excellent, good,
//! fair, poor). Scores interpolate linearly between the band anchors
//! 1.0, 0.8, 0.6 and 0.3, then decay past the poor threshold without ever
//! dropping below 0.1.

use crate::telemetry::Metric;

const BAND_SCORES: [f64; 4] = [1.0, 0.8, 0.6, 0.3];
const TAIL_START: f64 = 0.3;
const FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Linear,
    /// Interpolate on log10 of the value
    Log10,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tail {
    /// `0.3 * exp(-(distance past poor) / scale)`
    Exponential { scale: f64 },
    /// `0.3 * value / poor`, for higher-is-better metrics
    Proportional,
}

/// Four-band piecewise-linear curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandCurve {
    thresholds: [f64; 4],
    higher_is_better: bool,
    axis: Axis,
    tail: Tail,
}

impl BandCurve {
    pub const LATENCY: BandCurve = BandCurve {
        thresholds: [2.0, 5.0, 15.0, 50.0],
        higher_is_better: false,
        axis: Axis::Linear,
        tail: Tail::Exponential { scale: 50.0 },
    };

    pub const BIT_ERROR_RATE: BandCurve = BandCurve {
        thresholds: [1e-12, 1e-10, 1e-9, 1e-8],
        higher_is_better: false,
        axis: Axis::Log10,
        tail: Tail::Exponential { scale: 1.0 },
    };

    pub const TEMPERATURE: BandCurve = BandCurve {
        thresholds: [50.0, 65.0, 80.0, 90.0],
        higher_is_better: false,
        axis: Axis::Linear,
        tail: Tail::Exponential { scale: 20.0 },
    };

    pub const CRC_ERROR_RATE: BandCurve = BandCurve {
        thresholds: [1.0, 5.0, 20.0, 100.0],
        higher_is_better: false,
        axis: Axis::Linear,
        tail: Tail::Exponential { scale: 100.0 },
    };

    pub const SIGNAL_INTEGRITY: BandCurve = BandCurve {
        thresholds: [0.9, 0.8, 0.6, 0.4],
        higher_is_better: true,
        axis: Axis::Linear,
        tail: Tail::Proportional,
    };

    pub fn score(&self, value: f64) -> f64 {
        if value.is_nan() {
            return FLOOR;
        }
        if self.axis == Axis::Log10 && value <= 0.0 {
            return 1.0;
        }
        let t = self.thresholds;
        let better_or_equal = |v: f64, threshold: f64| {
            if self.higher_is_better {
                v >= threshold
            } else {
                v <= threshold
            }
        };

        if better_or_equal(value, t[0]) {
            return 1.0;
        }
        for band in 0..3 {
            if better_or_equal(value, t[band + 1]) {
                let position = self.position(value, t[band], t[band + 1]);
                let (hi, lo) = (BAND_SCORES[band], BAND_SCORES[band + 1]);
                return hi - (hi - lo) * position;
            }
        }

        let tail = match self.tail {
            Tail::Exponential { scale } => {
                let distance = match self.axis {
                    Axis::Linear => value - t[3],
                    Axis::Log10 => (value / t[3]).log10(),
                };
                TAIL_START * (-distance / scale).exp()
            }
            Tail::Proportional => TAIL_START * value / t[3],
        };
        tail.max(FLOOR)
    }

    /// Fraction of the way from `from` to `to`, in the curve's axis
    fn position(&self, value: f64, from: f64, to: f64) -> f64 {
        let (v, a, b) = match self.axis {
            Axis::Linear => (value, from, to),
            Axis::Log10 => (value.log10(), from.log10(), to.log10()),
        };
        ((v - a) / (b - a)).clamp(0.0, 1.0)
    }
}

const UTILIZATION_OPTIMUM: f64 = 0.7;
const UTILIZATION_BANDS: [f64; 3] = [0.8, 0.9, 0.95];

/// Utilization is best at 0.7: idle links score 0.5, and overload is
/// penalized progressively harder past 0.9.
pub fn utilization_score(utilization: f64) -> f64 {
    if utilization.is_nan() || utilization <= 0.0 {
        return 0.5;
    }
    if utilization <= UTILIZATION_OPTIMUM {
        return 0.5 + 0.5 * utilization / UTILIZATION_OPTIMUM;
    }
    let [good, fair, poor] = UTILIZATION_BANDS;
    let score = if utilization <= good {
        1.0 - 0.2 * (utilization - UTILIZATION_OPTIMUM) / (good - UTILIZATION_OPTIMUM)
    } else if utilization <= fair {
        0.8 - 0.2 * (utilization - good) / (fair - good)
    } else if utilization <= poor {
        0.6 - 0.3 * (utilization - fair) / (poor - fair)
    } else {
        (TAIL_START * (1.0 - utilization) / (1.0 - poor)).max(FLOOR)
    };
    score.clamp(FLOOR, 1.0)
}

/// Score one metric value
pub fn score_metric(metric: Metric, value: f64) -> f64 {
    let score = match metric {
        Metric::Latency => BandCurve::LATENCY.score(value),
        Metric::BitErrorRate => BandCurve::BIT_ERROR_RATE.score(value),
        Metric::Utilization => utilization_score(value),
        Metric::Temperature => BandCurve::TEMPERATURE.score(value),
        Metric::CrcErrorRate => BandCurve::CRC_ERROR_RATE.score(value),
        Metric::SignalIntegrity => BandCurve::SIGNAL_INTEGRITY.score(value),
    };
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_latency_band_anchors() {
        let c = BandCurve::LATENCY;
        assert!(close(c.score(1.0), 1.0));
        assert!(close(c.score(2.0), 1.0));
        assert!(close(c.score(5.0), 0.8));
        assert!(close(c.score(15.0), 0.6));
        assert!(close(c.score(50.0), 0.3));
        assert!(close(c.score(3.5), 0.9));
        assert!(c.score(100.0) < 0.3);
        assert!(close(c.score(10_000.0), 0.1));
    }

    #[test]
    fn test_bit_error_rate_uses_log_axis() {
        let c = BandCurve::BIT_ERROR_RATE;
        assert!(close(c.score(0.0), 1.0));
        assert!(close(c.score(1e-11), 0.9));
        assert!(close(c.score(1e-8), 0.3));
        assert!(close(c.score(1e-6), 0.1));
    }

    #[test]
    fn test_signal_integrity_higher_is_better() {
        let c = BandCurve::SIGNAL_INTEGRITY;
        assert!(close(c.score(0.95), 1.0));
        assert!(close(c.score(0.8), 0.8));
        assert!(close(c.score(0.4), 0.3));
        assert!(close(c.score(0.3), 0.225));
        assert!(close(c.score(0.0), 0.1));
    }

    #[test]
    fn test_utilization_shape() {
        assert!(close(utilization_score(0.0), 0.5));
        assert!(close(utilization_score(0.35), 0.75));
        assert!(close(utilization_score(0.7), 1.0));
        assert!(close(utilization_score(0.8), 0.8));
        assert!(close(utilization_score(0.9), 0.6));
        assert!(close(utilization_score(0.95), 0.3));
        assert!(close(utilization_score(1.0), 0.1));
        // steeper past 0.9 than below it
        let below = utilization_score(0.8) - utilization_score(0.85);
        let above = utilization_score(0.9) - utilization_score(0.95);
        assert!(above > below);
    }

    proptest! {
        #[test]
        fn prop_scores_in_unit_interval(value in prop::num::f64::ANY) {
            for metric in Metric::ALL {
                let s = score_metric(metric, value);
                prop_assert!((0.0..=1.0).contains(&s));
            }
        }

        #[test]
        fn prop_latency_is_monotone(a in 0.0f64..500.0, b in 0.0f64..500.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(BandCurve::LATENCY.score(lo) >= BandCurve::LATENCY.score(hi));
        }
    }
}
