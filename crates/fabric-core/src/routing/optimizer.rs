use super::{CostModel, RouteMetrics};
use crate::error::{FabricError, Result};
use crate::models::NodeId;
use crate::topology::Topology;
use petgraph::algo::astar;
use petgraph::graph::EdgeIndex;
use petgraph::visit::{EdgeFiltered, EdgeRef};
use serde::{Deserialize, Serialize};

/// A candidate must beat the current route's rank by this factor to trigger a reroute
pub const REROUTE_IMPROVEMENT: f64 = 1.2;
/// Average route health below which a reroute is always advised
const MIN_AVG_HEALTH: f64 = 0.4;

/// A route with its metrics and ranking score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub route: Vec<NodeId>,
    pub metrics: RouteMetrics,
    pub score: f64,
    /// Cost model that produced the route, `None` for edge-exclusion detours
    pub model: Option<CostModel>,
}

impl RouteCandidate {
    fn new(topology: &Topology, route: Vec<NodeId>, model: Option<CostModel>) -> Result<Self> {
        let metrics = RouteMetrics::compute(topology, &route)?;
        Ok(Self {
            score: metrics.rank(),
            route,
            metrics,
            model,
        })
    }
}

/// Shortest-path routing over an immutable topology snapshot
pub struct RoutingOptimizer<'a> {
    topology: &'a Topology,
}

impl<'a> RoutingOptimizer<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self { topology }
    }

    /// Cheapest route under `model`
    pub fn find_optimal_route(
        &self,
        source: NodeId,
        destination: NodeId,
        model: CostModel,
    ) -> Result<Vec<NodeId>> {
        if source == destination {
            return Ok(vec![source]);
        }
        self.shortest_path(source, destination, model, None)
    }

    /// Shortest path that ignores one edge of the graph. The graph itself is
    /// never modified; the exclusion is a filtered view.
    fn shortest_path(
        &self,
        source: NodeId,
        destination: NodeId,
        model: CostModel,
        excluded: Option<EdgeIndex>,
    ) -> Result<Vec<NodeId>> {
        let from = self.topology.index_of(source)?;
        let to = self.topology.index_of(destination)?;
        let graph = self.topology.graph();
        let view = EdgeFiltered::from_fn(graph, |e| Some(e.id()) != excluded);

        astar(&view, from, |n| n == to, |e| model.weight(e.weight()), |_| 0.0)
            .map(|(_, path)| path.into_iter().map(|idx| graph[idx].id).collect())
            .ok_or_else(|| FabricError::NoPath(source.to_string(), destination.to_string()))
    }

    pub fn route_metrics(&self, route: &[NodeId]) -> Result<RouteMetrics> {
        RouteMetrics::compute(self.topology, route)
    }

    /// Up to `k` distinct routes, best ranked first.
    ///
    /// Each cost model contributes its optimum. While short of `k`, the most
    /// utilized edges are excluded one at a time and the health-optimal
    /// detour is added when new.
    pub fn find_alternatives(
        &self,
        source: NodeId,
        destination: NodeId,
        k: usize,
    ) -> Result<Vec<RouteCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut candidates: Vec<RouteCandidate> = Vec::with_capacity(k);

        for model in CostModel::ALL {
            if candidates.len() >= k {
                break;
            }
            let route = self.find_optimal_route(source, destination, model)?;
            if !candidates.iter().any(|c| c.route == route) {
                candidates.push(RouteCandidate::new(self.topology, route, Some(model))?);
            }
        }

        if candidates.len() < k && source != destination {
            let graph = self.topology.graph();
            let mut by_load: Vec<_> = graph.edge_references().collect();
            by_load.sort_by(|a, b| b.weight().utilization.total_cmp(&a.weight().utilization));

            for edge in by_load {
                if candidates.len() >= k {
                    break;
                }
                let route =
                    match self.shortest_path(source, destination, CostModel::Health, Some(edge.id())) {
                        Ok(route) => route,
                        Err(FabricError::NoPath(..)) => continue,
                        Err(e) => return Err(e),
                    };
                if !candidates.iter().any(|c| c.route == route) {
                    candidates.push(RouteCandidate::new(self.topology, route, None)?);
                }
            }
        }

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Whether `route` should be replaced: a link below `threshold`, a weak
    /// average, or a clearly better candidate among the top two alternatives
    pub fn should_reroute(&self, route: &[NodeId], threshold: f64) -> Result<bool> {
        let metrics = self.route_metrics(route)?;
        let (Some(&source), Some(&destination)) = (route.first(), route.last()) else {
            return Ok(false);
        };
        if metrics.hops == 0 {
            return Ok(false);
        }
        if metrics.min_health < threshold || metrics.avg_health < MIN_AVG_HEALTH {
            return Ok(true);
        }

        let current = metrics.rank();
        let better = self
            .find_alternatives(source, destination, 2)?
            .iter()
            .any(|c| c.route != route && c.score >= current * REROUTE_IMPROVEMENT);
        Ok(better)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterconnectClass, LinkId};
    use crate::topology::fixtures::{compute, diamond, link};

    fn c(i: u32) -> NodeId {
        NodeId::compute(i)
    }

    fn s(i: u32) -> NodeId {
        NodeId::switch(i)
    }

    fn degrade_route(topo: &mut Topology, route: &[NodeId], health: f64) {
        for hop in route.windows(2) {
            let mut l = topo.link(&LinkId::new(hop[0], hop[1])).unwrap().clone();
            l.health_score = health;
            topo.add_link(l).unwrap();
        }
    }

    #[test]
    fn test_same_source_and_destination() {
        let topo = diamond();
        let opt = RoutingOptimizer::new(&topo);
        for model in CostModel::ALL {
            assert_eq!(opt.find_optimal_route(c(0), c(0), model).unwrap(), vec![c(0)]);
        }
        assert_eq!(opt.route_metrics(&[c(0)]).unwrap(), RouteMetrics::degenerate());
    }

    #[test]
    fn test_disconnected_nodes() {
        let mut topo = diamond();
        topo.add_node(compute(7));
        let opt = RoutingOptimizer::new(&topo);
        assert!(matches!(
            opt.find_optimal_route(c(0), c(7), CostModel::Health),
            Err(FabricError::NoPath(..))
        ));
        assert!(matches!(
            opt.find_optimal_route(c(0), c(9), CostModel::Health),
            Err(FabricError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_models_pick_expected_paths() {
        let topo = diamond();
        let opt = RoutingOptimizer::new(&topo);
        let fast = vec![c(0), s(0), c(1)];
        assert_eq!(opt.find_optimal_route(c(0), c(1), CostModel::Latency).unwrap(), fast);
        assert_eq!(opt.find_optimal_route(c(0), c(1), CostModel::Energy).unwrap(), fast);
    }

    #[test]
    fn test_health_model_avoids_degraded_links() {
        let mut topo = diamond();
        degrade_route(&mut topo, &[c(0), s(0), c(1)], 0.1);
        let opt = RoutingOptimizer::new(&topo);
        assert_eq!(
            opt.find_optimal_route(c(0), c(1), CostModel::Health).unwrap(),
            vec![c(0), s(1), c(1)]
        );
    }

    #[test]
    fn test_alternatives_are_distinct_even_when_models_agree() {
        let topo = diamond();
        let opt = RoutingOptimizer::new(&topo);
        let alts = opt.find_alternatives(c(0), c(1), 3).unwrap();
        assert_eq!(alts.len(), 2);
        assert_ne!(alts[0].route, alts[1].route);
        assert!(alts[0].score >= alts[1].score);
        assert_eq!(alts[0].route, vec![c(0), s(0), c(1)]);
    }

    #[test]
    fn test_alternatives_do_not_mutate_topology() {
        let topo = diamond();
        let before = topo.link_count();
        RoutingOptimizer::new(&topo).find_alternatives(c(0), c(1), 5).unwrap();
        assert_eq!(topo.link_count(), before);
    }

    #[test]
    fn test_should_reroute_on_weak_link() {
        let mut topo = diamond();
        let route = vec![c(0), s(0), c(1)];
        assert!(!RoutingOptimizer::new(&topo).should_reroute(&route, 0.5).unwrap());
        degrade_route(&mut topo, &route, 0.1);
        assert!(RoutingOptimizer::new(&topo).should_reroute(&route, 0.5).unwrap());
    }

    #[test]
    fn test_should_reroute_when_alternative_is_much_better() {
        let mut topo = diamond();
        let slow = vec![c(0), s(1), c(1)];
        assert!(RoutingOptimizer::new(&topo).should_reroute(&slow, 0.5).unwrap());
        topo.add_link(link(c(0), s(1), InterconnectClass::ClassA, 0.8)).unwrap();
        topo.add_link(link(s(1), c(1), InterconnectClass::ClassA, 0.8)).unwrap();
        assert!(!RoutingOptimizer::new(&topo).should_reroute(&slow, 0.5).unwrap());
    }

    #[test]
    fn test_should_reroute_rejects_broken_route() {
        let topo = diamond();
        let opt = RoutingOptimizer::new(&topo);
        assert!(opt.should_reroute(&[c(0), c(1)], 0.5).is_err());
        assert!(!opt.should_reroute(&[c(0)], 0.5).unwrap());
    }
}
