//! Route selection over the fabric graph
//!
//! Four [`CostModel`]s turn link attributes into edge weights for a
//! label-setting shortest-path search. The [`RoutingOptimizer`] works on an
//! immutable topology snapshot; every reroute it leads to is recorded in a
//! bounded [`DecisionLog`].

mod decisions;
mod optimizer;

pub use decisions::{DecisionLog, RoutingDecision, DECISION_CAPACITY};
pub use optimizer::{RouteCandidate, RoutingOptimizer, REROUTE_IMPROVEMENT};

use crate::error::{FabricError, Result};
use crate::models::{Link, NodeId};
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Edge weighting used by the path search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostModel {
    /// Strongly avoids degraded links
    #[default]
    Health,
    Latency,
    /// Prefers the cheapest interconnect class
    Energy,
    Balanced,
}

impl CostModel {
    pub const ALL: [CostModel; 4] = [Self::Health, Self::Latency, Self::Energy, Self::Balanced];

    /// Non-negative edge weight for a link
    pub fn weight(self, link: &Link) -> f64 {
        let health = link.health_score;
        let util = link.utilization;
        match self {
            CostModel::Health => health_penalty(health) * (1.0 + 2.0 * util),
            CostModel::Latency => {
                let w = link.base_latency * (1.0 + 2.0 * util);
                if health < 0.5 {
                    w * 2.0
                } else {
                    w
                }
            }
            CostModel::Energy => link.class.energy_weight() * (1.0 + 1.5 * util),
            CostModel::Balanced => {
                0.4 * (1.0 - health) * 4.0
                    + 0.4 * link.base_latency * (1.0 + util) / 10.0
                    + 0.2 * link.class.energy_weight() / 5.0
            }
        }
        .max(0.0)
    }
}

fn health_penalty(health: f64) -> f64 {
    if health < 0.3 {
        10.0
    } else if health < 0.6 {
        3.0
    } else {
        1.0
    }
}

impl fmt::Display for CostModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CostModel::Health => "health",
            CostModel::Latency => "latency",
            CostModel::Energy => "energy",
            CostModel::Balanced => "balanced",
        };
        f.write_str(name)
    }
}

impl FromStr for CostModel {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(CostModel::Health),
            "latency" => Ok(CostModel::Latency),
            "energy" => Ok(CostModel::Energy),
            "balanced" => Ok(CostModel::Balanced),
            other => Err(FabricError::invalid(format!("unknown cost model '{other}'"))),
        }
    }
}

/// Aggregate cost and health of a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    /// Sum of per-hop latency under current load
    pub total_latency: f64,
    pub avg_health: f64,
    pub min_health: f64,
    pub energy_cost: f64,
    pub hops: usize,
}

impl RouteMetrics {
    /// Metrics of a route that never leaves its source
    pub fn degenerate() -> Self {
        Self {
            total_latency: 0.0,
            avg_health: 1.0,
            min_health: 1.0,
            energy_cost: 0.0,
            hops: 0,
        }
    }

    /// Resolve every hop against the topology and aggregate
    pub fn compute(topology: &Topology, route: &[NodeId]) -> Result<Self> {
        if route.len() < 2 {
            if let Some(node) = route.first() {
                topology.index_of(*node)?;
            }
            return Ok(Self::degenerate());
        }
        let links = topology.route_links(route)?;
        Ok(Self::from_links(&links))
    }

    fn from_links(links: &[&Link]) -> Self {
        let hops = links.len();
        let total_latency = links.iter().map(|l| l.effective_latency()).sum();
        let energy_cost = links
            .iter()
            .map(|l| l.class.energy_weight() * (1.0 + l.utilization))
            .sum();
        let health_sum: f64 = links.iter().map(|l| l.health_score).sum();
        let min_health = links
            .iter()
            .map(|l| l.health_score)
            .fold(f64::INFINITY, f64::min);
        Self {
            total_latency,
            avg_health: health_sum / hops as f64,
            min_health,
            energy_cost,
            hops,
        }
    }

    /// Ranking score: healthier and faster routes score higher
    pub fn rank(&self) -> f64 {
        self.avg_health / (self.total_latency + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterconnectClass, LinkId};
    use crate::topology::fixtures::diamond;

    fn link(class: InterconnectClass, latency: f64, util: f64, health: f64) -> Link {
        let mut link = Link::new(
            LinkId::new(NodeId::compute(0), NodeId::switch(0)),
            class,
            400.0,
            latency,
        );
        link.utilization = util;
        link.health_score = health;
        link
    }

    #[test]
    fn test_health_model_penalties() {
        let healthy = link(InterconnectClass::ClassA, 1.0, 0.0, 0.9);
        let weak = link(InterconnectClass::ClassA, 1.0, 0.0, 0.5);
        let failing = link(InterconnectClass::ClassA, 1.0, 0.0, 0.1);
        assert_eq!(CostModel::Health.weight(&healthy), 1.0);
        assert_eq!(CostModel::Health.weight(&weak), 3.0);
        assert_eq!(CostModel::Health.weight(&failing), 10.0);
        let loaded = link(InterconnectClass::ClassA, 1.0, 0.5, 0.9);
        assert_eq!(CostModel::Health.weight(&loaded), 2.0);
    }

    #[test]
    fn test_latency_model_doubles_when_unhealthy() {
        let ok = link(InterconnectClass::ClassB, 2.0, 0.25, 0.8);
        let bad = link(InterconnectClass::ClassB, 2.0, 0.25, 0.4);
        assert!((CostModel::Latency.weight(&ok) - 3.0).abs() < 1e-12);
        assert!((CostModel::Latency.weight(&bad) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_energy_model_orders_classes() {
        let a = CostModel::Energy.weight(&link(InterconnectClass::ClassA, 1.0, 0.2, 1.0));
        let b = CostModel::Energy.weight(&link(InterconnectClass::ClassB, 1.0, 0.2, 1.0));
        let c = CostModel::Energy.weight(&link(InterconnectClass::ClassC, 1.0, 0.2, 1.0));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_balanced_model_formula() {
        let l = link(InterconnectClass::ClassC, 2.0, 0.5, 0.75);
        let expected = 0.4 * 0.25 * 4.0 + 0.4 * 2.0 * 1.5 / 10.0 + 0.2 * 1.5 / 5.0;
        assert!((CostModel::Balanced.weight(&l) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_parse_cost_model() {
        assert_eq!("Latency".parse::<CostModel>().unwrap(), CostModel::Latency);
        assert!(matches!(
            "cheapest".parse::<CostModel>(),
            Err(FabricError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_route_metrics() {
        let topo = diamond();
        let route = [NodeId::compute(0), NodeId::switch(0), NodeId::compute(1)];
        let m = RouteMetrics::compute(&topo, &route).unwrap();
        assert_eq!(m.hops, route.len() - 1);
        assert!((m.total_latency - 2.0 * 0.8 * 1.2).abs() < 1e-12);
        assert!((m.energy_cost - 2.0 * 1.2).abs() < 1e-12);
        assert_eq!(m.avg_health, 1.0);
        assert_eq!(m.min_health, 1.0);
    }

    #[test]
    fn test_route_metrics_degenerate_and_broken() {
        let topo = diamond();
        assert_eq!(
            RouteMetrics::compute(&topo, &[NodeId::compute(0)]).unwrap(),
            RouteMetrics::degenerate()
        );
        let broken = [NodeId::compute(0), NodeId::compute(1)];
        assert!(matches!(
            RouteMetrics::compute(&topo, &broken),
            Err(FabricError::LinkNotFound(_))
        ));
        let unknown = [NodeId::compute(0), NodeId::switch(9)];
        assert!(matches!(
            RouteMetrics::compute(&topo, &unknown),
            Err(FabricError::NodeNotFound(_))
        ));
    }
}
