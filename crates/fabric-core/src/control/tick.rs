//! The periodic tick and the loop driving it

use super::config::ControlConfig;
use super::snapshot::{LinkSnapshot, Snapshot, TickReport};
use crate::anomaly::{Alert, AlertLog, AnomalyDetector};
use crate::error::{FabricError, Result};
use crate::faults::FaultInjector;
use crate::forecast::ForecastStore;
use crate::models::{Job, JobId, Link, LinkId, NodeId};
use crate::observability::{EventLogger, FabricMetrics};
use crate::probes::{components, ProbeRegistry};
use crate::routing::{DecisionLog, RoutingDecision, RoutingOptimizer};
use crate::scoring::HealthScorer;
use crate::telemetry::{TelemetrySample, TelemetrySource};
use crate::topology::{LinkUpdate, TopologyStore};
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of evaluating the jobs affected by one tick
#[derive(Debug, Default)]
struct ReroutePass {
    evaluated: usize,
    rerouted: usize,
    failures: Vec<String>,
}

/// Everything the tick reads and writes. Shared by the loop task and the
/// control plane handle.
pub(crate) struct Engine {
    pub config: ControlConfig,
    pub store: TopologyStore,
    pub source: Arc<dyn TelemetrySource>,
    pub scorer: HealthScorer,
    pub detector: AnomalyDetector,
    pub alerts: AlertLog,
    pub decisions: DecisionLog,
    pub faults: FaultInjector,
    pub forecasts: ForecastStore,
    pub metrics: FabricMetrics,
    pub events: EventLogger,
    pub probes: ProbeRegistry,
    pub rng: Mutex<StdRng>,
    pub snapshot_tx: watch::Sender<Arc<Snapshot>>,
    /// Serializes every writer: ticks, reroutes, fault injection and rebuilds
    pub writer: tokio::sync::Mutex<()>,
    pub ticks: AtomicU64,
}

impl Engine {
    /// Run one tick under the writer lock
    pub async fn tick(&self) -> TickReport {
        let _writer = self.writer.lock().await;
        self.tick_locked().await
    }

    /// Body of a tick; the caller holds the writer lock
    async fn tick_locked(&self) -> TickReport {
        let start = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let topology = self.store.topology();
        let generation = self.store.generation();
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        // Collect
        let links: Vec<_> = topology.links().cloned().collect();
        let mut samples = Vec::with_capacity(links.len());
        let mut failed_links = Vec::new();
        for link in &links {
            match self.collect(link).await {
                Ok(sample) => samples.push((link.id, sample)),
                Err(e) => {
                    warn!(link_id = %link.id, error = %e, "Telemetry collection failed");
                    failed_links.push(link.id);
                }
            }
        }
        report.link_errors = failed_links.len();

        // Detect and score
        let mut updates = Vec::with_capacity(samples.len());
        let mut processed = BTreeMap::new();
        for (link_id, sample) in samples {
            let anomaly = self.detector.detect(link_id, &sample);
            let health = self.scorer.score(link_id, &sample);

            if anomaly.is_anomaly {
                report.anomalies += 1;
                self.metrics.inc_anomalies_detected();
                let alert = Alert::new(
                    link_id,
                    &sample,
                    health.overall_score,
                    anomaly.explanation.clone(),
                );
                self.events.log_anomaly(
                    &link_id,
                    &alert.severity.to_string(),
                    health.overall_score,
                    &alert.explanation.summary(),
                );
                self.alerts.push(alert);
                self.metrics.inc_alerts_emitted();
                report.alerts += 1;
            }

            self.forecasts.record(link_id, &sample, health.overall_score);
            updates.push(LinkUpdate {
                link: link_id,
                health: health.overall_score,
                utilization: sample.utilization,
            });
            processed.insert(
                link_id,
                LinkSnapshot {
                    telemetry: sample,
                    health,
                    is_anomaly: anomaly.is_anomaly,
                    anomaly_score: anomaly.anomaly_score,
                },
            );
        }
        report.links_scored = processed.len();

        // Push scores, then reroute jobs crossing links whose health moved
        let changed = self.store.apply_updates(&updates);
        let pass = self.reroute_affected(&changed);
        report.jobs_evaluated = pass.evaluated;
        report.reroutes = pass.rerouted;
        if pass.evaluated > 0 {
            self.update_routing_probe(pass.evaluated, &pass.failures).await;
        }

        // Publish
        self.snapshot_tx.send_replace(Arc::new(Snapshot {
            generation,
            tick,
            timestamp: Utc::now(),
            links: processed,
            failed_links,
        }));

        let elapsed = start.elapsed();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());
        self.metrics.set_links_monitored(report.links_scored as i64);
        self.metrics.inc_tick_errors(report.link_errors as u64);
        self.metrics.set_active_faults(self.faults.active_count() as i64);
        self.metrics.set_topology_generation(generation);
        self.update_telemetry_probe(links.len(), report.link_errors).await;

        if tick % self.config.stats_every.max(1) == 0 {
            debug!(
                tick,
                links = report.links_scored,
                errors = report.link_errors,
                anomalies = report.anomalies,
                reroutes = report.reroutes,
                elapsed_ms = elapsed.as_millis() as u64,
                "Tick complete"
            );
        }
        report
    }

    async fn collect(&self, link: &Link) -> Result<TelemetrySample> {
        let raw = self
            .source
            .collect(link)
            .await
            .map_err(|e| FabricError::Telemetry {
                link: link.id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(TelemetrySample::from_raw(&raw))
    }

    async fn update_telemetry_probe(&self, total: usize, failed: usize) {
        if total > 0 && failed == total {
            self.probes
                .set_unhealthy(components::TELEMETRY, format!("all {total} links failed to report"))
                .await;
        } else if failed > 0 {
            self.probes
                .set_degraded(
                    components::TELEMETRY,
                    format!("{failed} of {total} links failed to report"),
                )
                .await;
        } else {
            self.probes.set_healthy(components::TELEMETRY).await;
        }
    }

    /// Evaluate every job crossing a changed link once
    fn reroute_affected(&self, changed: &[LinkId]) -> ReroutePass {
        let mut pass = ReroutePass::default();
        if changed.is_empty() {
            return pass;
        }
        let mut seen = BTreeSet::new();
        let mut affected: Vec<Job> = Vec::new();
        for link in changed {
            for job in self.store.jobs_using_link(link) {
                if seen.insert(job.id) {
                    affected.push(job);
                }
            }
        }

        pass.evaluated = affected.len();
        for job in &affected {
            match self.auto_reroute(job) {
                Ok(true) => pass.rerouted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Reroute evaluation failed");
                    pass.failures.push(format!("{}: {e}", job.id));
                }
            }
        }
        pass
    }

    /// Routing is unhealthy while any job in the last evaluation pass could not be evaluated
    pub async fn update_routing_probe(&self, evaluated: usize, failures: &[String]) {
        match failures.first() {
            Some(first) => {
                self.probes
                    .set_unhealthy(
                        components::ROUTING,
                        format!(
                            "{} of {evaluated} reroute evaluations failed ({first})",
                            failures.len()
                        ),
                    )
                    .await;
            }
            None => self.probes.set_healthy(components::ROUTING).await,
        }
    }

    fn auto_reroute(&self, job: &Job) -> Result<bool> {
        if job.route.len() < 2 {
            return Ok(false);
        }
        let topology = self.store.topology();
        let optimizer = RoutingOptimizer::new(&topology);
        if !optimizer.should_reroute(&job.route, self.config.reroute_threshold)? {
            return Ok(false);
        }
        let new_route =
            optimizer.find_optimal_route(job.source, job.destination, self.config.reroute_model)?;
        if new_route == job.route {
            return Ok(false);
        }
        let reason = format!(
            "Automatic reroute: route health below {:.2} or better path available",
            self.config.reroute_threshold
        );
        self.commit_reroute(job.id, &job.route, new_route, reason, &optimizer)
            .map(|d| d.is_some())
    }

    /// Replace a job's route if it still equals `expected`, recording the decision
    pub fn commit_reroute(
        &self,
        job_id: JobId,
        expected: &[NodeId],
        new_route: Vec<NodeId>,
        reason: String,
        optimizer: &RoutingOptimizer<'_>,
    ) -> Result<Option<RoutingDecision>> {
        let metrics_before = optimizer.route_metrics(expected)?;
        let metrics_after = optimizer.route_metrics(&new_route)?;
        if !self
            .store
            .replace_route(job_id, expected, new_route.clone())?
        {
            return Ok(None);
        }
        let decision = RoutingDecision {
            timestamp: Utc::now(),
            job_id,
            old_route: expected.to_vec(),
            new_route,
            reason,
            metrics_before,
            metrics_after,
        };
        self.events
            .log_reroute(job_id, &decision.old_route, &decision.new_route, &decision.reason);
        self.metrics.inc_reroutes();
        self.decisions.push(decision.clone());
        Ok(Some(decision))
    }

    /// Publish an empty snapshot for the current generation
    pub fn publish_empty(&self) {
        self.snapshot_tx
            .send_replace(Arc::new(Snapshot::empty(self.store.generation())));
    }
}

/// Periodic driver of [`Engine::tick`].
///
/// The stop flag and shutdown signal are only observed between ticks; an
/// in-flight tick always runs to completion.
pub(crate) struct ControlLoop {
    engine: Arc<Engine>,
    running: Arc<AtomicBool>,
}

impl ControlLoop {
    pub fn new(engine: Arc<Engine>, running: Arc<AtomicBool>) -> Self {
        Self { engine, running }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.engine.config.tick_interval;
        self.engine.events.log_loop_started(period.as_millis());
        self.engine.probes.set_healthy(components::CONTROL_LOOP).await;

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut completed = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.engine.tick().await;
                    completed += 1;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }

        self.engine.events.log_loop_stopped(completed);
    }
}
