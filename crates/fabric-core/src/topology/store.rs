//! Topology store
//!
//! Owns the current [`Topology`] and the job table behind one lock. The
//! topology itself is held in an `Arc` and mutated copy-on-write, so readers
//! can take a cheap immutable handle and run path searches against it while
//! the control loop keeps writing.

use super::builder::{BuildParams, TopologyBuilder};
use super::Topology;
use crate::error::{FabricError, Result};
use crate::models::{
    unit_clamp, InterconnectClass, Job, JobId, JobSpec, Link, LinkId, Node, NodeId, NodeRole,
};
use chrono::Utc;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Health changes smaller than this do not count as a change
const HEALTH_EPSILON: f64 = 1e-6;
/// Utilization ceiling applied by `degrade`
const DEGRADE_UTILIZATION_CAP: f64 = 0.9;

#[derive(Debug, Default)]
struct StoreState {
    topology: Arc<Topology>,
    jobs: BTreeMap<JobId, Job>,
    next_job_id: u64,
    generation: u64,
}

impl StoreState {
    fn insert_job(&mut self, spec: JobSpec, route: Vec<NodeId>) -> Job {
        self.next_job_id += 1;
        let job = Job {
            id: JobId(self.next_job_id),
            source: spec.source,
            destination: spec.destination,
            route,
            bandwidth_gbps: spec.bandwidth_gbps,
            priority: spec.priority,
            job_type: spec.job_type,
            created_at: Utc::now(),
        };
        self.jobs.insert(job.id, job.clone());
        job
    }
}

/// New health and utilization for one link, as computed by a tick
#[derive(Debug, Clone, Copy)]
pub struct LinkUpdate {
    pub link: LinkId,
    pub health: f64,
    pub utilization: f64,
}

/// Aggregate counts over the current topology
#[derive(Debug, Clone, Serialize)]
pub struct TopologyStats {
    pub generation: u64,
    pub compute_nodes: usize,
    pub switches: usize,
    pub links: usize,
    pub links_by_class: HashMap<InterconnectClass, usize>,
    pub jobs: usize,
    pub average_health: f64,
}

#[derive(Debug, Default)]
pub struct TopologyStore {
    state: RwLock<StoreState>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a prebuilt topology and no jobs
    pub fn from_topology(topology: Topology) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            state.topology = Arc::new(topology);
            state.generation = 1;
        }
        store
    }

    /// Regenerate the fabric. Clears every job, seeds new sample jobs and bumps the generation.
    pub fn rebuild<R: Rng>(&self, params: &BuildParams, rng: &mut R) -> Result<u64> {
        let mut builder = TopologyBuilder::new(params, rng);
        let topology = builder.build()?;
        let samples = builder.sample_jobs(&topology);

        let mut state = self.state.write();
        state.topology = Arc::new(topology);
        state.jobs.clear();
        for (spec, route) in samples {
            state.insert_job(spec, route);
        }
        state.generation += 1;
        debug!(
            generation = state.generation,
            links = state.topology.link_count(),
            jobs = state.jobs.len(),
            "Topology rebuilt"
        );
        Ok(state.generation)
    }

    /// Immutable handle on the current topology
    pub fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.state.read().topology)
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn link(&self, id: &LinkId) -> Result<Link> {
        self.state
            .read()
            .topology
            .link(id)
            .cloned()
            .ok_or_else(|| FabricError::LinkNotFound(id.to_string()))
    }

    pub fn links(&self) -> Vec<Link> {
        let state = self.state.read();
        let mut links: Vec<Link> = state.topology.links().cloned().collect();
        links.sort_by_key(|l| l.id);
        links
    }

    pub fn nodes(&self) -> Vec<Node> {
        let state = self.state.read();
        let mut nodes: Vec<Node> = state.topology.nodes().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        self.state.read().topology.link_ids()
    }

    /// Set a link's health, clamped into [0,1]
    pub fn update_health(&self, id: &LinkId, score: f64) -> Result<()> {
        let mut state = self.state.write();
        Arc::make_mut(&mut state.topology).link_mut(id)?.health_score = unit_clamp(score);
        Ok(())
    }

    /// Scale base latency up by `2 - factor`, raise utilization by half (capped
    /// at 0.9), then set health to `factor`. A factor of 1.0 leaves the link
    /// untouched apart from the utilization bump; 0.0 is a failed link.
    pub fn degrade(&self, id: &LinkId, factor: f64) -> Result<()> {
        let factor = unit_clamp(factor);
        let mut state = self.state.write();
        let link = Arc::make_mut(&mut state.topology).link_mut(id)?;
        link.base_latency *= 2.0 - factor;
        link.utilization = (link.utilization * 1.5).min(DEGRADE_UTILIZATION_CAP);
        link.health_score = factor;
        Ok(())
    }

    pub fn set_utilization(&self, id: &LinkId, utilization: f64) -> Result<()> {
        let mut state = self.state.write();
        Arc::make_mut(&mut state.topology).link_mut(id)?.utilization = unit_clamp(utilization);
        Ok(())
    }

    pub fn get_utilization(&self, id: &LinkId) -> Result<f64> {
        self.link(id).map(|l| l.utilization)
    }

    /// Apply a tick's worth of scores in one write. Returns the links whose health changed.
    pub fn apply_updates(&self, updates: &[LinkUpdate]) -> Vec<LinkId> {
        let mut state = self.state.write();
        let topology = Arc::make_mut(&mut state.topology);
        let mut changed = Vec::new();
        for update in updates {
            let Ok(link) = topology.link_mut(&update.link) else {
                continue;
            };
            let health = unit_clamp(update.health);
            if (link.health_score - health).abs() > HEALTH_EPSILON {
                changed.push(update.link);
            }
            link.health_score = health;
            link.utilization = unit_clamp(update.utilization);
        }
        changed
    }

    /// Reset every link's health to 1.0
    pub fn reset_health(&self) {
        let mut state = self.state.write();
        for link in Arc::make_mut(&mut state.topology).links_mut() {
            link.health_score = 1.0;
        }
    }

    /// Jobs whose route traverses the link in either direction
    pub fn jobs_using_link(&self, id: &LinkId) -> Vec<Job> {
        self.state
            .read()
            .jobs
            .values()
            .filter(|job| job.uses_link(id))
            .cloned()
            .collect()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.state.read().jobs.values().cloned().collect()
    }

    pub fn job(&self, id: JobId) -> Result<Job> {
        self.state
            .read()
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| FabricError::JobNotFound(id.to_string()))
    }

    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }

    /// Register a job on the given route, which must be a connected walk from source to destination
    pub fn add_job(&self, spec: JobSpec, route: Vec<NodeId>) -> Result<Job> {
        let mut state = self.state.write();
        validate_route(&state.topology, &spec, &route)?;
        Ok(state.insert_job(spec, route))
    }

    /// Replace a job's route only if it still equals `expected`.
    ///
    /// Returns `Ok(false)` when the route moved underneath the caller, which
    /// leaves the job untouched.
    pub fn replace_route(&self, id: JobId, expected: &[NodeId], route: Vec<NodeId>) -> Result<bool> {
        let mut state = self.state.write();
        if !state.topology.is_connected_walk(&route) {
            return Err(FabricError::invalid(format!(
                "route for {id} is not a connected walk"
            )));
        }
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| FabricError::JobNotFound(id.to_string()))?;
        if job.route != expected {
            return Ok(false);
        }
        if route.first() != Some(&job.source) || route.last() != Some(&job.destination) {
            return Err(FabricError::invalid(format!(
                "route for {id} does not join its endpoints"
            )));
        }
        job.route = route;
        Ok(true)
    }

    pub fn stats(&self) -> TopologyStats {
        let state = self.state.read();
        let topo = &state.topology;
        let mut links_by_class = HashMap::new();
        let mut health_sum = 0.0;
        for link in topo.links() {
            *links_by_class.entry(link.class).or_insert(0) += 1;
            health_sum += link.health_score;
        }
        let count_role = |role: NodeRole| topo.nodes().filter(|n| n.role() == role).count();
        TopologyStats {
            generation: state.generation,
            compute_nodes: count_role(NodeRole::Compute),
            switches: count_role(NodeRole::Switch),
            links: topo.link_count(),
            links_by_class,
            jobs: state.jobs.len(),
            average_health: if topo.link_count() == 0 {
                1.0
            } else {
                health_sum / topo.link_count() as f64
            },
        }
    }
}

fn validate_route(topology: &Topology, spec: &JobSpec, route: &[NodeId]) -> Result<()> {
    topology.index_of(spec.source)?;
    topology.index_of(spec.destination)?;
    if route.first() != Some(&spec.source) || route.last() != Some(&spec.destination) {
        return Err(FabricError::invalid("route does not join the job endpoints"));
    }
    topology.route_links(route)?;
    Ok(())
}
