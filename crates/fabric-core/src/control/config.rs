use crate::anomaly::{OutlierConfig, ALERT_CAPACITY};
use crate::forecast::ForecasterKind;
use crate::routing::{CostModel, DECISION_CAPACITY};
use std::time::Duration;

/// Tunables of the control plane
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Name attached to structured events
    pub fabric_name: String,
    pub tick_interval: Duration,
    /// Minimum link health a job's route may carry before it is rerouted
    pub reroute_threshold: f64,
    /// Cost model used for automatic reroutes
    pub reroute_model: CostModel,
    pub alert_capacity: usize,
    pub decision_capacity: usize,
    /// New samples between outlier model refits
    pub outlier_retrain_interval: usize,
    pub outlier_min_samples: usize,
    pub outlier_buffer: usize,
    pub forecaster: ForecasterKind,
    pub forecast_window: usize,
    /// Fixed seed for topology generation and fault targeting
    pub seed: Option<u64>,
    /// Ticks between debug summaries
    pub stats_every: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            fabric_name: "fabric".to_string(),
            tick_interval: Duration::from_secs(3),
            reroute_threshold: 0.6,
            reroute_model: CostModel::Health,
            alert_capacity: ALERT_CAPACITY,
            decision_capacity: DECISION_CAPACITY,
            outlier_retrain_interval: 100,
            outlier_min_samples: 20,
            outlier_buffer: 1000,
            forecaster: ForecasterKind::Linear,
            forecast_window: 50,
            seed: None,
            stats_every: 20,
        }
    }
}

impl ControlConfig {
    pub fn builder() -> ControlConfigBuilder {
        ControlConfigBuilder::default()
    }

    pub(crate) fn outlier_config(&self) -> OutlierConfig {
        let defaults = OutlierConfig::default();
        OutlierConfig {
            buffer_capacity: self.outlier_buffer.max(1),
            min_samples: self.outlier_min_samples.max(2),
            retrain_interval: self.outlier_retrain_interval.max(1),
            seed: self.seed.unwrap_or(defaults.seed),
            ..defaults
        }
    }
}

/// Fluent builder for [`ControlConfig`]
#[derive(Debug, Clone, Default)]
pub struct ControlConfigBuilder {
    config: ControlConfig,
}

impl ControlConfigBuilder {
    pub fn fabric_name(mut self, name: impl Into<String>) -> Self {
        self.config.fabric_name = name.into();
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn reroute_threshold(mut self, threshold: f64) -> Self {
        self.config.reroute_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn reroute_model(mut self, model: CostModel) -> Self {
        self.config.reroute_model = model;
        self
    }

    pub fn alert_capacity(mut self, capacity: usize) -> Self {
        self.config.alert_capacity = capacity;
        self
    }

    pub fn decision_capacity(mut self, capacity: usize) -> Self {
        self.config.decision_capacity = capacity;
        self
    }

    pub fn outlier_retrain_interval(mut self, samples: usize) -> Self {
        self.config.outlier_retrain_interval = samples;
        self
    }

    pub fn outlier_min_samples(mut self, samples: usize) -> Self {
        self.config.outlier_min_samples = samples;
        self
    }

    pub fn outlier_buffer(mut self, samples: usize) -> Self {
        self.config.outlier_buffer = samples;
        self
    }

    pub fn forecaster(mut self, kind: ForecasterKind) -> Self {
        self.config.forecaster = kind;
        self
    }

    pub fn forecast_window(mut self, window: usize) -> Self {
        self.config.forecast_window = window;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn stats_every(mut self, ticks: u64) -> Self {
        self.config.stats_every = ticks.max(1);
        self
    }

    pub fn build(self) -> ControlConfig {
        self.config
    }
}
