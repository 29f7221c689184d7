use super::config::ControlConfig;
use super::snapshot::{Snapshot, TickReport};
use super::tick::{ControlLoop, Engine};
use crate::anomaly::{Alert, AlertLog, AlertSeverity, AnomalyDetector};
use crate::error::{FabricError, Result};
use crate::faults::{FaultEvent, FaultInjector, FaultKind, FaultParams};
use crate::forecast::{FleetForecast, ForecastStore, LinkForecast};
use crate::models::{InterconnectClass, Job, JobId, JobSpec, Link, LinkId, Node, NodeId};
use crate::observability::{EventLogger, FabricMetrics};
use crate::probes::{components, ProbeRegistry};
use crate::routing::{
    CostModel, DecisionLog, RouteCandidate, RouteMetrics, RoutingDecision, RoutingOptimizer,
};
use crate::scoring::{FleetSummary, HealthScorer};
use crate::telemetry::TelemetrySource;
use crate::topology::{BuildParams, Topology, TopologyStats, TopologyStore};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Alternatives returned alongside an optimal route
const ROUTE_ALTERNATIVES: usize = 3;

/// Informational result of loop start/stop commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
}

impl LoopStatus {
    pub fn message(self) -> &'static str {
        match self {
            LoopStatus::Started => "control loop started",
            LoopStatus::AlreadyRunning => "control loop already running",
            LoopStatus::Stopped => "control loop stopped",
            LoopStatus::NotRunning => "control loop not running",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOptimization {
    pub source: NodeId,
    pub destination: NodeId,
    pub model: CostModel,
    pub route: Vec<NodeId>,
    pub metrics: RouteMetrics,
    pub alternatives: Vec<RouteCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteOutcome {
    pub job_id: JobId,
    pub rerouted: bool,
    pub old_route: Vec<NodeId>,
    pub new_route: Vec<NodeId>,
    pub reason: String,
    pub decision: Option<RoutingDecision>,
}

impl RerouteOutcome {
    fn unchanged(job: &Job, reason: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            rerouted: false,
            old_route: job.route.clone(),
            new_route: job.route.clone(),
            reason: reason.into(),
            decision: None,
        }
    }
}

/// Per-hop detail of an analysed route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkBreakdown {
    pub link_id: LinkId,
    pub class: InterconnectClass,
    pub health_score: f64,
    pub utilization: f64,
    pub effective_latency: f64,
    pub bandwidth_gbps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub route: Vec<NodeId>,
    pub metrics: RouteMetrics,
    pub should_reroute: bool,
    pub links: Vec<LinkBreakdown>,
    /// Jobs currently running over exactly this route
    pub jobs: Vec<JobId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlStatus {
    pub fabric: String,
    pub running: bool,
    pub generation: u64,
    pub nodes: usize,
    pub links: usize,
    pub jobs: usize,
    pub alerts: usize,
    pub routing_decisions: usize,
    pub active_faults: usize,
    pub ticks_completed: u64,
    pub forecaster: String,
}

struct LoopHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// In-process capability surface of the fabric control plane.
///
/// One background loop is the only periodic writer; commands that mutate the
/// topology or job table go through the same writer lock, so a job's route is
/// never read, compared and replaced concurrently by two writers. Readers use
/// the published [`Snapshot`] and read-only accessors and never block writers
/// for long.
pub struct FabricControlPlane {
    engine: Arc<Engine>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<LoopHandle>>,
}

impl FabricControlPlane {
    /// Control plane over an empty fabric; call [`rebuild_topology`](Self::rebuild_topology) to populate it
    pub fn new(config: ControlConfig, source: Arc<dyn TelemetrySource>) -> Result<Self> {
        Self::with_store(config, source, TopologyStore::new())
    }

    /// Control plane over a prebuilt topology with no jobs
    pub fn with_topology(
        config: ControlConfig,
        source: Arc<dyn TelemetrySource>,
        topology: Topology,
    ) -> Result<Self> {
        Self::with_store(config, source, TopologyStore::from_topology(topology))
    }

    fn with_store(
        config: ControlConfig,
        source: Arc<dyn TelemetrySource>,
        store: TopologyStore,
    ) -> Result<Self> {
        let metrics = FabricMetrics::new()?;
        metrics.set_topology_generation(store.generation());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty(store.generation())));

        let engine = Engine {
            scorer: HealthScorer::new(),
            detector: AnomalyDetector::new(config.outlier_config()),
            alerts: AlertLog::new(config.alert_capacity),
            decisions: DecisionLog::new(config.decision_capacity),
            faults: FaultInjector::new(config.seed.map(|s| s.wrapping_add(1))),
            forecasts: ForecastStore::new(config.forecast_window, config.forecaster.build()),
            events: EventLogger::new(config.fabric_name.clone()),
            probes: ProbeRegistry::new(),
            rng: Mutex::new(rng),
            snapshot_tx,
            writer: tokio::sync::Mutex::new(()),
            ticks: AtomicU64::new(0),
            metrics,
            store,
            source,
            config,
        };
        Ok(Self {
            engine: Arc::new(engine),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.engine.config
    }

    pub fn metrics(&self) -> &FabricMetrics {
        &self.engine.metrics
    }

    pub fn probes(&self) -> &ProbeRegistry {
        &self.engine.probes
    }

    // ---- loop control ----

    /// Spawn the periodic loop onto the current tokio runtime. A second call
    /// while running is a no-op.
    pub fn start_loop(&self) -> LoopStatus {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return LoopStatus::AlreadyRunning;
        }
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        self.running.store(true, Ordering::SeqCst);
        let control_loop = ControlLoop::new(Arc::clone(&self.engine), Arc::clone(&self.running));
        let task = tokio::spawn(control_loop.run(shutdown_rx));
        *handle = Some(LoopHandle { shutdown, task });
        LoopStatus::Started
    }

    /// Ask the loop to stop at the next tick boundary and wait for it to exit
    pub async fn stop_loop(&self) -> LoopStatus {
        let Some(handle) = self.handle.lock().take() else {
            return LoopStatus::NotRunning;
        };
        self.running.store(false, Ordering::SeqCst);
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            warn!(error = %e, "Control loop task ended abnormally");
        }
        self.engine
            .probes
            .set_degraded(components::CONTROL_LOOP, "control loop stopped")
            .await;
        LoopStatus::Stopped
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Run a single tick now, serialized with the loop and other writers
    pub async fn tick_once(&self) -> TickReport {
        self.engine.tick().await
    }

    /// Regenerate the fabric. The loop is paused for the swap and resumed if it was running.
    pub async fn rebuild_topology(
        &self,
        compute_nodes: usize,
        switches: usize,
        classes: Vec<InterconnectClass>,
    ) -> Result<u64> {
        let params = BuildParams::new(compute_nodes, switches, classes);
        params.validate()?;

        let was_running = self.stop_loop().await == LoopStatus::Stopped;
        let result = {
            let _writer = self.engine.writer.lock().await;
            let rebuilt = {
                let mut rng = self.engine.rng.lock();
                self.engine.store.rebuild(&params, &mut *rng)
            };
            if let Ok(generation) = rebuilt {
                self.clear_derived_state();
                self.engine.metrics.set_topology_generation(generation);
                self.engine.publish_empty();
                let stats = self.engine.store.stats();
                self.engine
                    .events
                    .log_topology_rebuilt(generation, stats.links, stats.jobs);
            }
            rebuilt
        };
        if was_running {
            self.start_loop();
        }
        result
    }

    fn clear_derived_state(&self) {
        let engine = &self.engine;
        engine.alerts.clear();
        engine.decisions.clear();
        engine.faults.forget();
        engine.source.clear_perturbations();
        engine.scorer.clear();
        engine.detector.reset();
        engine.forecasts.clear();
        engine.metrics.set_active_faults(0);
    }

    // ---- published state ----

    /// The latest complete snapshot
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.engine.snapshot_tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.engine.snapshot_tx.subscribe()
    }

    pub fn alerts(&self, window: Option<Duration>, severity: Option<AlertSeverity>) -> Vec<Alert> {
        self.engine.alerts.query(window, severity)
    }

    pub fn routing_decisions(&self, window: Option<Duration>, limit: usize) -> Vec<RoutingDecision> {
        self.engine.decisions.query(window, limit)
    }

    pub fn fleet_health(&self) -> FleetSummary {
        self.engine.scorer.fleet_summary()
    }

    pub fn health_history(&self, link_id: &LinkId) -> Result<Vec<f64>> {
        self.engine.store.link(link_id)?;
        Ok(self.engine.scorer.history(link_id))
    }

    // ---- routing ----

    pub fn optimize_route(
        &self,
        source: NodeId,
        destination: NodeId,
        model: CostModel,
    ) -> Result<RouteOptimization> {
        let topology = self.engine.store.topology();
        let optimizer = RoutingOptimizer::new(&topology);
        let route = optimizer.find_optimal_route(source, destination, model)?;
        let metrics = optimizer.route_metrics(&route)?;
        let alternatives = optimizer.find_alternatives(source, destination, ROUTE_ALTERNATIVES)?;
        Ok(RouteOptimization {
            source,
            destination,
            model,
            route,
            metrics,
            alternatives,
        })
    }

    /// Move a job onto the optimal route under `model`. Without `force` a
    /// healthy or already optimal route is left alone; with `force` the best
    /// differing alternative is taken when the optimum is the current route.
    pub async fn reroute(&self, job_id: JobId, model: CostModel, force: bool) -> Result<RerouteOutcome> {
        let _writer = self.engine.writer.lock().await;
        let job = self.engine.store.job(job_id)?;
        if job.route.len() < 2 {
            return Ok(RerouteOutcome::unchanged(&job, "job source equals destination"));
        }

        let topology = self.engine.store.topology();
        let optimizer = RoutingOptimizer::new(&topology);
        if !force
            && !optimizer.should_reroute(&job.route, self.engine.config.reroute_threshold)?
        {
            return Ok(RerouteOutcome::unchanged(&job, "current route is healthy"));
        }

        let mut new_route = optimizer.find_optimal_route(job.source, job.destination, model)?;
        if new_route == job.route {
            if !force {
                return Ok(RerouteOutcome::unchanged(&job, "current route is already optimal"));
            }
            let alternative = optimizer
                .find_alternatives(job.source, job.destination, ROUTE_ALTERNATIVES)?
                .into_iter()
                .find(|c| c.route != job.route);
            match alternative {
                Some(candidate) => new_route = candidate.route,
                None => return Ok(RerouteOutcome::unchanged(&job, "no alternative route exists")),
            }
        }

        let reason = if force {
            format!("Forced reroute using {model} cost model")
        } else {
            format!("Manual reroute using {model} cost model")
        };
        let decision =
            self.engine
                .commit_reroute(job.id, &job.route, new_route.clone(), reason.clone(), &optimizer)?;
        Ok(match decision {
            Some(decision) => RerouteOutcome {
                job_id: job.id,
                rerouted: true,
                old_route: job.route,
                new_route,
                reason,
                decision: Some(decision),
            },
            None => RerouteOutcome::unchanged(&job, "route changed concurrently"),
        })
    }

    /// Metrics, reroute advice and per-hop breakdown of an arbitrary route
    pub fn analyze_route(&self, route: &[NodeId]) -> Result<RouteAnalysis> {
        if route.len() < 2 {
            return Err(FabricError::invalid("route must contain at least two nodes"));
        }
        let topology = self.engine.store.topology();
        let links = topology.route_links(route)?;
        let optimizer = RoutingOptimizer::new(&topology);
        let metrics = optimizer.route_metrics(route)?;
        let should_reroute =
            optimizer.should_reroute(route, self.engine.config.reroute_threshold)?;

        let breakdown = links
            .iter()
            .map(|l| LinkBreakdown {
                link_id: l.id,
                class: l.class,
                health_score: l.health_score,
                utilization: l.utilization,
                effective_latency: l.effective_latency(),
                bandwidth_gbps: l.bandwidth_gbps,
            })
            .collect();
        let jobs = self
            .engine
            .store
            .jobs()
            .into_iter()
            .filter(|j| j.route == route)
            .map(|j| j.id)
            .collect();

        Ok(RouteAnalysis {
            route: route.to_vec(),
            metrics,
            should_reroute,
            links: breakdown,
            jobs,
        })
    }

    // ---- faults ----

    pub async fn inject_fault(&self, kind: FaultKind, params: FaultParams) -> Result<FaultEvent> {
        let _writer = self.engine.writer.lock().await;
        let event = self.engine.faults.inject(
            kind,
            &params,
            &self.engine.store,
            self.engine.source.as_ref(),
        )?;
        self.engine
            .events
            .log_fault_injected(kind.name(), event.targets.len(), &event.description);
        self.engine
            .metrics
            .set_active_faults(self.engine.faults.active_count() as i64);
        Ok(event)
    }

    pub fn active_faults(&self) -> Vec<FaultEvent> {
        self.engine.faults.active()
    }

    /// Clear every fault and reset all link health to 1.0. Returns the number of faults cleared.
    pub async fn stop_all_faults(&self) -> usize {
        let _writer = self.engine.writer.lock().await;
        let cleared = self
            .engine
            .faults
            .stop_all(&self.engine.store, self.engine.source.as_ref());
        self.engine.metrics.set_active_faults(0);
        self.engine.events.log_faults_cleared(cleared);
        cleared
    }

    // ---- forecasting ----

    pub fn forecast(&self, link_id: LinkId, horizon: usize) -> Result<LinkForecast> {
        self.engine.store.link(&link_id)?;
        self.engine.forecasts.forecast_link(link_id, horizon)
    }

    pub fn fleet_forecast(&self, horizon: usize) -> Result<FleetForecast> {
        self.engine.forecasts.fleet_forecast(horizon)
    }

    // ---- topology and jobs ----

    pub fn links(&self) -> Vec<Link> {
        self.engine.store.links()
    }

    pub fn link(&self, id: &LinkId) -> Result<Link> {
        self.engine.store.link(id)
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.engine.store.nodes()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.engine.store.jobs()
    }

    pub fn job(&self, id: JobId) -> Result<Job> {
        self.engine.store.job(id)
    }

    /// Register a job on the current health-optimal route
    pub async fn add_job(&self, spec: JobSpec) -> Result<Job> {
        let _writer = self.engine.writer.lock().await;
        let topology = self.engine.store.topology();
        let route = RoutingOptimizer::new(&topology).find_optimal_route(
            spec.source,
            spec.destination,
            CostModel::Health,
        )?;
        let job = self.engine.store.add_job(spec, route)?;
        info!(job_id = %job.id, hops = job.route.len().saturating_sub(1), "Job registered");
        Ok(job)
    }

    /// Set a link's health directly, clamped into [0,1]
    pub async fn update_link_health(&self, id: &LinkId, score: f64) -> Result<()> {
        let _writer = self.engine.writer.lock().await;
        self.engine.store.update_health(id, score)
    }

    pub fn topology_stats(&self) -> TopologyStats {
        self.engine.store.stats()
    }

    pub fn status(&self) -> ControlStatus {
        let stats = self.engine.store.stats();
        ControlStatus {
            fabric: self.engine.events.fabric().to_string(),
            running: self.is_running(),
            generation: stats.generation,
            nodes: stats.compute_nodes + stats.switches,
            links: stats.links,
            jobs: stats.jobs,
            alerts: self.engine.alerts.len(),
            routing_decisions: self.engine.decisions.len(),
            active_faults: self.engine.faults.active_count(),
            ticks_completed: self.engine.ticks.load(Ordering::Relaxed),
            forecaster: self.engine.forecasts.forecaster_name().to_string(),
        }
    }
}

impl Drop for FabricControlPlane {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.shutdown.send(());
        }
    }
}
