use super::{FaultEvent, FaultKind, FaultParams, FaultTarget};
use crate::error::{FabricError, Result};
use crate::models::LinkId;
use crate::telemetry::{Perturbation, PerturbationKind, TelemetrySource};
use crate::topology::TopologyStore;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const MAX_INTERMITTENT_LINKS: usize = 3;
const MAX_THERMAL_NEIGHBOURS: usize = 2;
const CONGESTION_CAP: f64 = 0.95;
const CONGESTION_SECS: u64 = 180;
const FAILURE_TELEMETRY_SEVERITY: f64 = 0.9;
const CASCADE_MIN_LINKS: usize = 3;
const CASCADE_STAGES: usize = 3;
const CASCADE_INITIAL_HEALTH: f64 = 0.1;
const CASCADE_STAGE_DELAY_SECS: u64 = 30;
const CASCADE_SECS: u64 = 300;

/// Injects faults into a topology store and its telemetry source, and
/// tracks them until they expire
pub struct FaultInjector {
    rng: Mutex<StdRng>,
    events: RwLock<Vec<FaultEvent>>,
    next_id: AtomicU64,
}

impl FaultInjector {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            events: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn inject(
        &self,
        kind: FaultKind,
        params: &FaultParams,
        store: &TopologyStore,
        source: &dyn TelemetrySource,
    ) -> Result<FaultEvent> {
        params.validate()?;
        let links = store.link_ids();
        if links.is_empty() {
            return Err(FabricError::invalid("no links available for fault injection"));
        }
        if let Some(target) = &params.target {
            store.link(target)?;
        }

        let mut rng = self.rng.lock();
        let primary = match params.target {
            Some(target) => target,
            None => *links
                .choose(&mut *rng)
                .ok_or_else(|| FabricError::invalid("no links available for fault injection"))?,
        };

        let mut event = match kind {
            FaultKind::LinkDegradation => {
                let severity = params.severity.unwrap_or_else(|| rng.gen_range(0.3..0.7));
                let secs = duration_secs(params, || rng.gen_range(120..=300));
                store.degrade(&primary, 1.0 - severity)?;
                source.perturb(primary, degradation(severity, secs));
                self.event(
                    kind,
                    vec![target(primary, severity)],
                    severity,
                    secs,
                    format!(
                        "Degraded {primary} by {:.1}% for {secs} seconds",
                        severity * 100.0
                    ),
                )
            }
            FaultKind::SuddenFailure => {
                let secs = duration_secs(params, || rng.gen_range(60..=180));
                store.degrade(&primary, 0.0)?;
                source.perturb(primary, degradation(FAILURE_TELEMETRY_SEVERITY, secs));
                self.event(
                    kind,
                    vec![target(primary, 1.0)],
                    1.0,
                    secs,
                    format!("Complete failure of {primary} for {secs} seconds"),
                )
            }
            FaultKind::IntermittentIssues => {
                let chosen = pick_links(&mut *rng, &links, params.target, MAX_INTERMITTENT_LINKS);
                let mut targets = Vec::with_capacity(chosen.len());
                let mut longest = 0;
                for link in chosen {
                    let severity = params.severity.unwrap_or_else(|| rng.gen_range(0.2..0.5));
                    let secs = duration_secs(params, || rng.gen_range(30..=90));
                    source.perturb(link, degradation(severity, secs));
                    longest = longest.max(secs);
                    targets.push(target(link, severity));
                }
                let peak = targets.iter().map(|t| t.severity).fold(0.0, f64::max);
                let description = format!("Intermittent issues on {} links", targets.len());
                self.event(kind, targets, peak, longest, description)
            }
            FaultKind::CongestionStorm => {
                let share = rng.gen_range(0.2..0.5);
                let count = ((links.len() as f64 * share) as usize).max(1);
                let chosen = pick_links(&mut *rng, &links, params.target, count);
                let secs = duration_secs(params, || CONGESTION_SECS);
                let mut targets = Vec::with_capacity(chosen.len());
                for link in chosen {
                    let current = store.get_utilization(&link)?;
                    let raised = (current + rng.gen_range(0.3..0.6)).min(CONGESTION_CAP);
                    let increase = (raised - current).max(0.0);
                    store.set_utilization(&link, raised)?;
                    source.perturb(
                        link,
                        Perturbation {
                            kind: PerturbationKind::Congestion,
                            severity: increase,
                            duration: Duration::from_secs(secs),
                        },
                    );
                    targets.push(target(link, increase));
                }
                let peak = targets.iter().map(|t| t.severity).fold(0.0, f64::max);
                let description = format!("Traffic spike affecting {} links", targets.len());
                self.event(kind, targets, peak, secs, description)
            }
            FaultKind::ThermalEvent => {
                let severity = params.severity.unwrap_or_else(|| rng.gen_range(0.3..0.6));
                let secs = duration_secs(params, || rng.gen_range(300..=600));
                store.degrade(&primary, 1.0 - severity)?;
                source.perturb(primary, degradation(severity, secs));

                let neighbours = store.topology().adjacent_links(&primary);
                let spread_secs = ((secs as f64) * 0.7).round() as u64;
                let mut targets = vec![target(primary, severity)];
                for link in neighbours.iter().take(MAX_THERMAL_NEIGHBOURS) {
                    let minor = severity * 0.5;
                    source.perturb(*link, degradation(minor, spread_secs.max(1)));
                    targets.push(target(*link, minor));
                }
                let description = format!(
                    "Thermal event affecting {primary} and {} nearby links",
                    targets.len() - 1
                );
                self.event(kind, targets, severity, secs, description)
            }
            FaultKind::CascadeFailure => {
                if links.len() < CASCADE_MIN_LINKS {
                    return Err(FabricError::invalid(format!(
                        "cascade failure needs at least {CASCADE_MIN_LINKS} links, topology has {}",
                        links.len()
                    )));
                }
                let secs = duration_secs(params, || CASCADE_SECS);
                let initial = params.severity.map_or(CASCADE_INITIAL_HEALTH, |s| 1.0 - s);
                store.degrade(&primary, initial)?;
                source.perturb(primary, degradation(1.0 - initial, secs));

                let mut remaining: Vec<LinkId> =
                    links.iter().copied().filter(|l| *l != primary).collect();
                remaining.shuffle(&mut *rng);
                let mut targets = vec![target(primary, 1.0 - initial)];
                for (i, link) in remaining.into_iter().take(CASCADE_STAGES).enumerate() {
                    let severity = 0.4 + 0.1 * i as f64;
                    store.degrade(&link, 1.0 - severity)?;
                    source.perturb(link, degradation(severity, secs));
                    targets.push(FaultTarget {
                        link,
                        severity,
                        delay_secs: i as u64 * CASCADE_STAGE_DELAY_SECS,
                    });
                }
                let stages: Vec<String> = targets[1..]
                    .iter()
                    .map(|t| {
                        format!(
                            "{} after {}s at {:.0}%",
                            t.link,
                            t.delay_secs,
                            t.severity * 100.0
                        )
                    })
                    .collect();
                let description = format!(
                    "Cascade failure starting with {primary}, affecting {} additional links ({})",
                    stages.len(),
                    stages.join(", ")
                );
                self.event(kind, targets, 1.0 - initial, secs, description)
            }
        };
        drop(rng);

        event.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.events.write().push(event.clone());
        Ok(event)
    }

    fn event(
        &self,
        kind: FaultKind,
        targets: Vec<FaultTarget>,
        severity: f64,
        duration_secs: u64,
        description: String,
    ) -> FaultEvent {
        FaultEvent {
            id: 0,
            kind,
            targets,
            severity,
            started_at: Utc::now(),
            duration_secs,
            description,
        }
    }

    /// Unexpired faults, oldest first. Expired entries are dropped.
    pub fn active(&self) -> Vec<FaultEvent> {
        let now = Utc::now();
        let mut events = self.events.write();
        events.retain(|e| e.is_active_at(now));
        events.clone()
    }

    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.events
            .read()
            .iter()
            .filter(|e| e.is_active_at(now))
            .count()
    }

    /// Clear every fault, reset all link health to 1.0 and drop telemetry perturbations
    pub fn stop_all(&self, store: &TopologyStore, source: &dyn TelemetrySource) -> usize {
        let stopped = {
            let mut events = self.events.write();
            let n = events.len();
            events.clear();
            n
        };
        store.reset_health();
        source.clear_perturbations();
        stopped
    }

    /// Forget tracked faults without touching the topology
    pub fn forget(&self) {
        self.events.write().clear();
    }
}

fn duration_secs(params: &FaultParams, default: impl FnOnce() -> u64) -> u64 {
    params
        .duration
        .map(|d| d.as_secs().max(1))
        .unwrap_or_else(default)
}

fn degradation(severity: f64, secs: u64) -> Perturbation {
    Perturbation {
        kind: PerturbationKind::Degradation,
        severity,
        duration: Duration::from_secs(secs),
    }
}

fn target(link: LinkId, severity: f64) -> FaultTarget {
    FaultTarget {
        link,
        severity,
        delay_secs: 0,
    }
}

/// `count` distinct links, always including `required` when given
fn pick_links<R: Rng>(
    rng: &mut R,
    links: &[LinkId],
    required: Option<LinkId>,
    count: usize,
) -> Vec<LinkId> {
    let count = count.min(links.len());
    let mut chosen: Vec<LinkId> = required.into_iter().collect();
    let mut rest: Vec<LinkId> = links
        .iter()
        .copied()
        .filter(|l| Some(*l) != required)
        .collect();
    rest.shuffle(rng);
    chosen.extend(rest.into_iter().take(count.saturating_sub(chosen.len())));
    chosen
}
