//! Short-horizon forecasting of link metrics
//!
//! A [`Forecaster`] extrapolates one series. [`LinearTrendForecaster`] is always
//! available; [`HoltForecaster`] is an optional alternative chosen through
//! [`ForecasterKind`]. The [`ForecastStore`] keeps per-link history and turns
//! forecasts into predicted issues.

mod store;

pub use store::{
    FleetForecast, ForecastConfidence, ForecastIssue, ForecastMetric, ForecastStore, IssueSeverity,
    LinkForecast, MAX_FORECAST_HORIZON, MIN_FORECAST_POINTS,
};

use crate::error::{FabricError, Result};
use crate::stats::{self, LinearFit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// z for a two-sided 95% interval
const Z_95: f64 = 1.96;
/// Points used to estimate the spread of the linear forecast
const SPREAD_WINDOW: usize = 10;

/// Projected values with 95% bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub values: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// Goodness of fit where the method has one
    pub r_squared: Option<f64>,
}

impl Forecast {
    fn constant(value: f64, horizon: usize) -> Self {
        Self {
            values: vec![value; horizon],
            lower: vec![value; horizon],
            upper: vec![value; horizon],
            r_squared: None,
        }
    }
}

/// Extrapolates an evenly spaced series
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &'static str;

    fn forecast(&self, series: &[f64], horizon: usize) -> Forecast;
}

/// Least-squares trend line; fewer than three points yields a flat forecast
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendForecaster;

impl Forecaster for LinearTrendForecaster {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn forecast(&self, series: &[f64], horizon: usize) -> Forecast {
        let last = series.last().copied().unwrap_or(0.0);
        if series.len() < 3 {
            return Forecast::constant(last, horizon);
        }
        let Some(fit) = LinearFit::fit(series) else {
            return Forecast::constant(last, horizon);
        };

        let recent = &series[series.len().saturating_sub(SPREAD_WINDOW)..];
        let spread = Z_95 * stats::std_dev(recent);
        let n = series.len();
        let values: Vec<f64> = (0..horizon).map(|i| fit.at((n + i) as f64)).collect();
        Forecast {
            lower: values.iter().map(|v| v - spread).collect(),
            upper: values.iter().map(|v| v + spread).collect(),
            values,
            r_squared: Some(fit.r_squared),
        }
    }
}

/// Double exponential smoothing with level and trend terms
#[derive(Debug, Clone, Copy)]
pub struct HoltForecaster {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for HoltForecaster {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.3,
        }
    }
}

impl Forecaster for HoltForecaster {
    fn name(&self) -> &'static str {
        "holt"
    }

    fn forecast(&self, series: &[f64], horizon: usize) -> Forecast {
        let last = series.last().copied().unwrap_or(0.0);
        if series.len() < 2 {
            return Forecast::constant(last, horizon);
        }

        let mut level = series[0];
        let mut trend = series[1] - series[0];
        let mut sq_err = 0.0;
        for &y in &series[1..] {
            let predicted = level + trend;
            sq_err += (y - predicted).powi(2);
            let prev_level = level;
            level = self.alpha * y + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
        }
        let sigma = (sq_err / (series.len() - 1) as f64).sqrt();

        let values: Vec<f64> = (1..=horizon).map(|h| level + h as f64 * trend).collect();
        let widths: Vec<f64> = (1..=horizon)
            .map(|h| Z_95 * sigma * (h as f64).sqrt())
            .collect();
        Forecast {
            lower: values.iter().zip(&widths).map(|(v, w)| v - w).collect(),
            upper: values.iter().zip(&widths).map(|(v, w)| v + w).collect(),
            values,
            r_squared: None,
        }
    }
}

/// Forecaster selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecasterKind {
    #[default]
    Linear,
    Holt,
}

impl ForecasterKind {
    pub fn build(self) -> Arc<dyn Forecaster> {
        match self {
            ForecasterKind::Linear => Arc::new(LinearTrendForecaster),
            ForecasterKind::Holt => Arc::new(HoltForecaster::default()),
        }
    }
}

impl fmt::Display for ForecasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecasterKind::Linear => f.write_str("linear"),
            ForecasterKind::Holt => f.write_str("holt"),
        }
    }
}

impl FromStr for ForecasterKind {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ForecasterKind::Linear),
            "holt" => Ok(ForecasterKind::Holt),
            other => Err(FabricError::invalid(format!("unknown forecaster '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_extends_trend() {
        let series: Vec<f64> = (0..20).map(|i| 2.0 + 0.5 * i as f64).collect();
        let f = LinearTrendForecaster.forecast(&series, 3);
        assert_eq!(f.values.len(), 3);
        assert!((f.values[0] - 12.0).abs() < 1e-9);
        assert!((f.values[2] - 13.0).abs() < 1e-9);
        assert!((f.r_squared.unwrap() - 1.0).abs() < 1e-9);
        for i in 0..3 {
            assert!(f.lower[i] <= f.values[i] && f.values[i] <= f.upper[i]);
        }
    }

    #[test]
    fn test_linear_short_series_is_flat() {
        let f = LinearTrendForecaster.forecast(&[4.0, 9.0], 4);
        assert_eq!(f.values, vec![9.0; 4]);
        assert_eq!(f.lower, f.upper);
        assert!(LinearTrendForecaster.forecast(&[], 2).values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_holt_tracks_linear_series() {
        let series: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let f = HoltForecaster::default().forecast(&series, 2);
        assert!((f.values[0] - 30.0).abs() < 1e-6);
        assert!((f.values[1] - 31.0).abs() < 1e-6);
    }

    #[test]
    fn test_holt_bounds_widen_with_horizon() {
        let series = [1.0, 1.4, 0.9, 1.6, 1.1, 1.5, 1.0, 1.7];
        let f = HoltForecaster::default().forecast(&series, 5);
        let width = |i: usize| f.upper[i] - f.lower[i];
        assert!(width(4) > width(0));
    }

    #[test]
    fn test_forecaster_kind() {
        assert_eq!("HOLT".parse::<ForecasterKind>().unwrap(), ForecasterKind::Holt);
        assert_eq!(ForecasterKind::Linear.build().name(), "linear");
        assert!("arima".parse::<ForecasterKind>().is_err());
    }
}
