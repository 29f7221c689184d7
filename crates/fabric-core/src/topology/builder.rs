//! Randomized fabric generation

use super::Topology;
use crate::error::{FabricError, Result};
use crate::models::{
    InterconnectClass, JobPriority, JobSpec, JobType, Link, LinkId, Node, NodeCapability, NodeId,
};
use petgraph::algo::astar;
use rand::seq::SliceRandom;
use rand::Rng;

pub const MIN_COMPUTE_NODES: usize = 2;
pub const MAX_COMPUTE_NODES: usize = 64;
pub const MIN_SWITCHES: usize = 1;
pub const MAX_SWITCHES: usize = 32;

/// Probability that any two switches are directly linked
const SWITCH_PAIR_PROBABILITY: f64 = 0.7;

const MEMORY_CHOICES_GB: &[u32] = &[16, 24, 32, 48, 80];
const COMPUTE_CAPABILITIES: &[f64] = &[7.5, 8.0, 8.6, 9.0];
const PORT_CHOICES: &[u32] = &[16, 32, 64];

/// Arguments of a topology rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub compute_nodes: usize,
    pub switches: usize,
    pub classes: Vec<InterconnectClass>,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            compute_nodes: 8,
            switches: 4,
            classes: InterconnectClass::ALL.to_vec(),
        }
    }
}

impl BuildParams {
    pub fn new(compute_nodes: usize, switches: usize, classes: Vec<InterconnectClass>) -> Self {
        Self {
            compute_nodes,
            switches,
            classes,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_COMPUTE_NODES..=MAX_COMPUTE_NODES).contains(&self.compute_nodes) {
            return Err(FabricError::invalid(format!(
                "compute node count {} outside {MIN_COMPUTE_NODES}..={MAX_COMPUTE_NODES}",
                self.compute_nodes
            )));
        }
        if !(MIN_SWITCHES..=MAX_SWITCHES).contains(&self.switches) {
            return Err(FabricError::invalid(format!(
                "switch count {} outside {MIN_SWITCHES}..={MAX_SWITCHES}",
                self.switches
            )));
        }
        if self.classes.is_empty() {
            return Err(FabricError::invalid("at least one interconnect class is required"));
        }
        Ok(())
    }
}

/// Generates a fabric and a handful of sample jobs from a caller-supplied RNG
pub struct TopologyBuilder<'a, R: Rng> {
    params: &'a BuildParams,
    rng: &'a mut R,
}

impl<'a, R: Rng> TopologyBuilder<'a, R> {
    pub fn new(params: &'a BuildParams, rng: &'a mut R) -> Self {
        Self { params, rng }
    }

    /// Build the graph. Every compute node is attached to one or two switches;
    /// switches are paired with probability 0.7.
    pub fn build(&mut self) -> Result<Topology> {
        self.params.validate()?;
        let mut topo = Topology::new();

        for i in 0..self.params.compute_nodes as u32 {
            let capability = NodeCapability::Compute {
                memory_gb: *MEMORY_CHOICES_GB.choose(self.rng).unwrap_or(&32),
                compute_capability: *COMPUTE_CAPABILITIES.choose(self.rng).unwrap_or(&8.0),
            };
            topo.add_node(Node {
                id: NodeId::compute(i),
                capability,
            });
        }
        let switches: Vec<NodeId> = (0..self.params.switches as u32).map(NodeId::switch).collect();
        for id in &switches {
            let ports = *PORT_CHOICES.choose(self.rng).unwrap_or(&32);
            topo.add_node(Node {
                id: *id,
                capability: NodeCapability::Switch { ports },
            });
        }

        for i in 0..self.params.compute_nodes as u32 {
            let fanout = self.rng.gen_range(1..=2).min(switches.len());
            let attached: Vec<NodeId> = switches
                .choose_multiple(self.rng, fanout)
                .copied()
                .collect();
            for switch in attached {
                let link = self.compute_link(NodeId::compute(i), switch);
                topo.add_link(link)?;
            }
        }

        let switch_classes: Vec<InterconnectClass> = {
            let requested: Vec<_> = self
                .params
                .classes
                .iter()
                .copied()
                .filter(|c| c.switch_profile().is_some())
                .collect();
            if requested.is_empty() {
                vec![InterconnectClass::ClassB, InterconnectClass::ClassC]
            } else {
                requested
            }
        };
        for (i, a) in switches.iter().enumerate() {
            for b in &switches[i + 1..] {
                if self.rng.gen_bool(SWITCH_PAIR_PROBABILITY) {
                    let link = self.switch_link(*a, *b, &switch_classes);
                    topo.add_link(link)?;
                }
            }
        }

        Ok(topo)
    }

    fn compute_link(&mut self, compute: NodeId, switch: NodeId) -> Link {
        let class = *self
            .params
            .classes
            .choose(self.rng)
            .unwrap_or(&InterconnectClass::ClassC);
        let profile = class.compute_profile();
        let (lo, hi) = profile.latency_range;
        let mut link = Link::new(
            LinkId::new(compute, switch),
            class,
            *profile.bandwidths_gbps.choose(self.rng).unwrap_or(&32.0),
            self.rng.gen_range(lo..hi),
        );
        link.utilization = self.rng.gen_range(0.1..0.3);
        link
    }

    fn switch_link(&mut self, a: NodeId, b: NodeId, classes: &[InterconnectClass]) -> Link {
        let class = *classes.choose(self.rng).unwrap_or(&InterconnectClass::ClassB);
        let profile = class
            .switch_profile()
            .unwrap_or_else(|| class.compute_profile());
        let (lo, hi) = profile.latency_range;
        let mut link = Link::new(
            LinkId::new(a, b),
            class,
            *profile.bandwidths_gbps.choose(self.rng).unwrap_or(&64.0),
            self.rng.gen_range(lo..hi),
        );
        link.utilization = self.rng.gen_range(0.2..0.5);
        link
    }

    /// Between 3 and 8 sample jobs on fewest-hop routes; unreachable pairs are skipped
    pub fn sample_jobs(&mut self, topo: &Topology) -> Vec<(JobSpec, Vec<NodeId>)> {
        let compute: Vec<NodeId> = topo
            .nodes()
            .map(|n| n.id)
            .filter(|id| id.is_compute())
            .collect();
        if compute.len() < 2 {
            return Vec::new();
        }

        let count = self.rng.gen_range(3..=8);
        let mut jobs = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(&source) = compute.choose(self.rng) else {
                break;
            };
            let others: Vec<NodeId> = compute.iter().copied().filter(|n| *n != source).collect();
            let Some(&destination) = others.choose(self.rng) else {
                continue;
            };
            let Some(route) = fewest_hops(topo, source, destination) else {
                continue;
            };
            let spec = JobSpec {
                source,
                destination,
                bandwidth_gbps: self.rng.gen_range(10..=100) as f64,
                priority: *[JobPriority::High, JobPriority::Medium, JobPriority::Low]
                    .choose(self.rng)
                    .unwrap_or(&JobPriority::Medium),
                job_type: *[JobType::Training, JobType::Inference, JobType::DataTransfer]
                    .choose(self.rng)
                    .unwrap_or(&JobType::Training),
            };
            jobs.push((spec, route));
        }
        jobs
    }
}

/// Unweighted shortest path
pub(crate) fn fewest_hops(topo: &Topology, source: NodeId, destination: NodeId) -> Option<Vec<NodeId>> {
    let from = topo.index_of(source).ok()?;
    let to = topo.index_of(destination).ok()?;
    let graph = topo.graph();
    astar(graph, from, |n| n == to, |_| 1u32, |_| 0)
        .map(|(_, path)| path.into_iter().map(|idx| graph[idx].id).collect())
}
