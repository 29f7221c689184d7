//! Observability for the fabric control plane
//!
//! Provides:
//! - Prometheus metrics (tick latency, links monitored, anomalies, alerts, reroutes, faults)
//! - Structured JSON-friendly event logging with tracing

use crate::error::Result;
use crate::models::{JobId, LinkId, NodeId};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Prometheus metrics for one control plane, registered in its own registry
#[derive(Clone)]
pub struct FabricMetrics {
    registry: Registry,
    tick_latency_seconds: Histogram,
    links_monitored: IntGauge,
    anomalies_detected: IntCounter,
    alerts_emitted: IntCounter,
    reroutes: IntCounter,
    tick_errors: IntCounter,
    active_faults: IntGauge,
    topology_generation: IntGauge,
}

impl FabricMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tick_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fabric_tick_latency_seconds",
                "Time spent processing one control loop tick",
            )
            .buckets(TICK_BUCKETS.to_vec()),
        )?;
        let links_monitored =
            IntGauge::new("fabric_links_monitored", "Number of links scored in the last tick")?;
        let anomalies_detected = IntCounter::new(
            "fabric_anomalies_detected_total",
            "Total number of anomalous link samples",
        )?;
        let alerts_emitted =
            IntCounter::new("fabric_alerts_emitted_total", "Total number of alerts emitted")?;
        let reroutes = IntCounter::new("fabric_reroutes_total", "Total number of job reroutes")?;
        let tick_errors = IntCounter::new(
            "fabric_tick_errors_total",
            "Total number of per-link failures during ticks",
        )?;
        let active_faults =
            IntGauge::new("fabric_active_faults", "Number of injected faults not yet expired")?;
        let topology_generation = IntGauge::new(
            "fabric_topology_generation",
            "Generation counter of the current topology",
        )?;

        registry.register(Box::new(tick_latency_seconds.clone()))?;
        registry.register(Box::new(links_monitored.clone()))?;
        registry.register(Box::new(anomalies_detected.clone()))?;
        registry.register(Box::new(alerts_emitted.clone()))?;
        registry.register(Box::new(reroutes.clone()))?;
        registry.register(Box::new(tick_errors.clone()))?;
        registry.register(Box::new(active_faults.clone()))?;
        registry.register(Box::new(topology_generation.clone()))?;

        Ok(Self {
            registry,
            tick_latency_seconds,
            links_monitored,
            anomalies_detected,
            alerts_emitted,
            reroutes,
            tick_errors,
            active_faults,
            topology_generation,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.tick_latency_seconds.observe(duration_secs);
    }

    pub fn set_links_monitored(&self, count: i64) {
        self.links_monitored.set(count);
    }

    pub fn inc_anomalies_detected(&self) {
        self.anomalies_detected.inc();
    }

    pub fn inc_alerts_emitted(&self) {
        self.alerts_emitted.inc();
    }

    pub fn inc_reroutes(&self) {
        self.reroutes.inc();
    }

    pub fn inc_tick_errors(&self, count: u64) {
        self.tick_errors.inc_by(count);
    }

    pub fn set_active_faults(&self, count: i64) {
        self.active_faults.set(count);
    }

    pub fn set_topology_generation(&self, generation: u64) {
        self.topology_generation.set(generation as i64);
    }
}

/// Structured logger for control plane events
///
/// Every event carries an `event` name and the fabric it belongs to.
#[derive(Debug, Clone)]
pub struct EventLogger {
    fabric: String,
}

impl EventLogger {
    pub fn new(fabric: impl Into<String>) -> Self {
        Self {
            fabric: fabric.into(),
        }
    }

    pub fn fabric(&self) -> &str {
        &self.fabric
    }

    pub fn log_loop_started(&self, tick_interval_ms: u128) {
        info!(
            event = "loop_started",
            fabric = %self.fabric,
            tick_interval_ms = tick_interval_ms as u64,
            "Control loop started"
        );
    }

    pub fn log_loop_stopped(&self, ticks: u64) {
        info!(
            event = "loop_stopped",
            fabric = %self.fabric,
            ticks = ticks,
            "Control loop stopped"
        );
    }

    pub fn log_anomaly(&self, link_id: &LinkId, severity: &str, health: f64, details: &str) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    fabric = %self.fabric,
                    link_id = %link_id,
                    severity = %severity,
                    health = health,
                    details = %details,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    fabric = %self.fabric,
                    link_id = %link_id,
                    severity = %severity,
                    health = health,
                    details = %details,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_reroute(
        &self,
        job_id: JobId,
        old_route: &[NodeId],
        new_route: &[NodeId],
        reason: &str,
    ) {
        info!(
            event = "job_rerouted",
            fabric = %self.fabric,
            job_id = %job_id,
            old_route = %format_route(old_route),
            new_route = %format_route(new_route),
            reason = %reason,
            "Job rerouted"
        );
    }

    pub fn log_fault_injected(&self, kind: &str, targets: usize, description: &str) {
        warn!(
            event = "fault_injected",
            fabric = %self.fabric,
            kind = %kind,
            targets = targets,
            description = %description,
            "Fault injected"
        );
    }

    pub fn log_faults_cleared(&self, count: usize) {
        info!(
            event = "faults_cleared",
            fabric = %self.fabric,
            count = count,
            "All faults stopped, links reset to healthy"
        );
    }

    pub fn log_topology_rebuilt(&self, generation: u64, links: usize, jobs: usize) {
        info!(
            event = "topology_rebuilt",
            fabric = %self.fabric,
            generation = generation,
            links = links,
            jobs = jobs,
            "Topology rebuilt"
        );
    }
}

pub(crate) fn format_route(route: &[NodeId]) -> String {
    route
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("->")
}
