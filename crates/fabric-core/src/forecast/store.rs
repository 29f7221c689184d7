use super::{Forecast, Forecaster};
use crate::error::{FabricError, Result};
use crate::models::LinkId;
use crate::telemetry::TelemetrySample;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// History needed before a link can be forecast
pub const MIN_FORECAST_POINTS: usize = 10;
/// Longest horizon a caller may request, in steps
pub const MAX_FORECAST_HORIZON: usize = 50;
/// Below this many points confidence is reported as medium
const HIGH_CONFIDENCE_POINTS: usize = 30;
const MAX_UPCOMING: usize = 10;

const LATENCY_LIMIT: f64 = 50.0;
const UTILIZATION_LIMIT: f64 = 0.9;
const HEALTH_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMetric {
    Latency,
    Utilization,
    BitErrorRate,
    Temperature,
    CrcErrorRate,
    Health,
}

impl ForecastMetric {
    pub const ALL: [ForecastMetric; 6] = [
        Self::Latency,
        Self::Utilization,
        Self::BitErrorRate,
        Self::Temperature,
        Self::CrcErrorRate,
        Self::Health,
    ];
}

impl fmt::Display for ForecastMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Latency => "latency",
            Self::Utilization => "utilization",
            Self::BitErrorRate => "bit_error_rate",
            Self::Temperature => "temperature",
            Self::CrcErrorRate => "crc_error_rate",
            Self::Health => "health",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastConfidence {
    Medium,
    High,
}

/// A threshold the forecast crosses within the horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastIssue {
    pub metric: ForecastMetric,
    pub severity: IssueSeverity,
    pub threshold: f64,
    /// First forecast step (0-based) at which the threshold is crossed
    pub time_to_issue: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkForecast {
    pub link_id: LinkId,
    pub horizon: usize,
    pub forecaster: String,
    pub forecasts: BTreeMap<ForecastMetric, Forecast>,
    pub issues: Vec<ForecastIssue>,
    pub confidence: ForecastConfidence,
    pub data_points: usize,
    pub last_observed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingIssue {
    pub link_id: LinkId,
    #[serde(flatten)]
    pub issue: ForecastIssue,
}

/// Predicted issues across every link with enough history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetForecast {
    pub links_analyzed: usize,
    pub links_with_issues: usize,
    pub issue_counts: BTreeMap<IssueSeverity, usize>,
    /// Earliest issues first
    pub upcoming: Vec<UpcomingIssue>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct HistoryPoint {
    timestamp: DateTime<Utc>,
    latency: f64,
    utilization: f64,
    bit_error_rate: f64,
    temperature: f64,
    crc_error_rate: f64,
    health: f64,
}

impl HistoryPoint {
    fn value(&self, metric: ForecastMetric) -> f64 {
        match metric {
            ForecastMetric::Latency => self.latency,
            ForecastMetric::Utilization => self.utilization,
            ForecastMetric::BitErrorRate => self.bit_error_rate,
            ForecastMetric::Temperature => self.temperature,
            ForecastMetric::CrcErrorRate => self.crc_error_rate,
            ForecastMetric::Health => self.health,
        }
    }
}

/// Per-link metric history feeding a configured [`Forecaster`]
pub struct ForecastStore {
    capacity: usize,
    forecaster: Arc<dyn Forecaster>,
    history: RwLock<HashMap<LinkId, VecDeque<HistoryPoint>>>,
}

fn check_horizon(horizon: usize) -> Result<()> {
    if !(1..=MAX_FORECAST_HORIZON).contains(&horizon) {
        return Err(FabricError::invalid(format!(
            "forecast horizon {horizon} outside 1..={MAX_FORECAST_HORIZON}"
        )));
    }
    Ok(())
}

impl ForecastStore {
    /// Keeps twice `window` points per link
    pub fn new(window: usize, forecaster: Arc<dyn Forecaster>) -> Self {
        Self {
            capacity: (window * 2).max(MIN_FORECAST_POINTS),
            forecaster,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn forecaster_name(&self) -> &'static str {
        self.forecaster.name()
    }

    pub fn record(&self, link_id: LinkId, sample: &TelemetrySample, health: f64) {
        let point = HistoryPoint {
            timestamp: sample.timestamp,
            latency: sample.latency,
            utilization: sample.utilization,
            bit_error_rate: sample.bit_error_rate,
            temperature: sample.temperature,
            crc_error_rate: sample.crc_error_rate,
            health,
        };
        let mut history = self.history.write();
        let series = history
            .entry(link_id)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if series.len() >= self.capacity {
            series.pop_front();
        }
        series.push_back(point);
    }

    pub fn data_points(&self, link_id: &LinkId) -> usize {
        self.history.read().get(link_id).map_or(0, VecDeque::len)
    }

    pub fn forecast_link(&self, link_id: LinkId, horizon: usize) -> Result<LinkForecast> {
        check_horizon(horizon)?;
        let points: Vec<HistoryPoint> = self
            .history
            .read()
            .get(&link_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        if points.len() < MIN_FORECAST_POINTS {
            return Err(FabricError::InsufficientData {
                required: MIN_FORECAST_POINTS,
                available: points.len(),
            });
        }

        let forecasts: BTreeMap<ForecastMetric, Forecast> = ForecastMetric::ALL
            .into_iter()
            .map(|metric| {
                let series: Vec<f64> = points.iter().map(|p| p.value(metric)).collect();
                (metric, self.forecaster.forecast(&series, horizon))
            })
            .collect();
        let issues = detect_issues(&forecasts);
        let confidence = if points.len() < HIGH_CONFIDENCE_POINTS {
            ForecastConfidence::Medium
        } else {
            ForecastConfidence::High
        };

        Ok(LinkForecast {
            link_id,
            horizon,
            forecaster: self.forecaster.name().to_string(),
            forecasts,
            issues,
            confidence,
            data_points: points.len(),
            last_observed: points.last().map(|p| p.timestamp),
        })
    }

    pub fn fleet_forecast(&self, horizon: usize) -> Result<FleetForecast> {
        check_horizon(horizon)?;
        let mut links: Vec<LinkId> = self
            .history
            .read()
            .iter()
            .filter(|(_, s)| s.len() >= MIN_FORECAST_POINTS)
            .map(|(id, _)| *id)
            .collect();
        links.sort();

        let mut issue_counts = BTreeMap::new();
        let mut upcoming = Vec::new();
        let mut links_with_issues = 0;
        for link_id in &links {
            let forecast = self.forecast_link(*link_id, horizon)?;
            if !forecast.issues.is_empty() {
                links_with_issues += 1;
            }
            for issue in forecast.issues {
                *issue_counts.entry(issue.severity).or_insert(0) += 1;
                upcoming.push(UpcomingIssue {
                    link_id: *link_id,
                    issue,
                });
            }
        }
        upcoming.sort_by_key(|u| u.issue.time_to_issue);
        upcoming.truncate(MAX_UPCOMING);

        Ok(FleetForecast {
            links_analyzed: links.len(),
            links_with_issues,
            issue_counts,
            upcoming,
            timestamp: Utc::now(),
        })
    }

    pub fn clear(&self) {
        self.history.write().clear();
    }
}

fn detect_issues(forecasts: &BTreeMap<ForecastMetric, Forecast>) -> Vec<ForecastIssue> {
    let checks: [(ForecastMetric, IssueSeverity, f64, fn(f64, f64) -> bool, &str); 3] = [
        (
            ForecastMetric::Latency,
            IssueSeverity::High,
            LATENCY_LIMIT,
            |v, t| v > t,
            "latency predicted above",
        ),
        (
            ForecastMetric::Utilization,
            IssueSeverity::Medium,
            UTILIZATION_LIMIT,
            |v, t| v > t,
            "utilization predicted above",
        ),
        (
            ForecastMetric::Health,
            IssueSeverity::Critical,
            HEALTH_FLOOR,
            |v, t| v < t,
            "health predicted below",
        ),
    ];

    checks
        .iter()
        .filter_map(|(metric, severity, threshold, crosses, label)| {
            let forecast = forecasts.get(metric)?;
            let step = forecast.values.iter().position(|v| crosses(*v, *threshold))?;
            Some(ForecastIssue {
                metric: *metric,
                severity: *severity,
                threshold: *threshold,
                time_to_issue: step,
                message: format!("{label} {threshold} in {step} steps"),
            })
        })
        .collect()
}
