//! End-to-end tests of the control plane capability surface

use async_trait::async_trait;
use fabric_core::anomaly::AlertSeverity;
use fabric_core::faults::{FaultKind, FaultParams};
use fabric_core::forecast::MAX_FORECAST_HORIZON;
use fabric_core::routing::CostModel;
use fabric_core::telemetry::{Perturbation, RawTelemetry, SyntheticTelemetry, TelemetrySource};
use fabric_core::topology::Topology;
use fabric_core::{
    ControlConfig, FabricControlPlane, FabricError, InterconnectClass, JobPriority, JobSpec,
    JobType, Link, LinkId, LoopStatus, Node, NodeCapability, NodeId,
};
use std::sync::Arc;
use std::time::Duration;

fn c(i: u32) -> NodeId {
    NodeId::compute(i)
}

fn s(i: u32) -> NodeId {
    NodeId::switch(i)
}

fn link(a: NodeId, b: NodeId, class: InterconnectClass, latency: f64, util: f64) -> Link {
    let mut link = Link::new(LinkId::new(a, b), class, 400.0, latency);
    link.utilization = util;
    link
}

/// Two disjoint two-hop paths from C0 to C1; the path through S0 is the
/// lightly loaded one.
fn diamond() -> Topology {
    let mut topo = Topology::new();
    for i in 0..2 {
        topo.add_node(Node {
            id: c(i),
            capability: NodeCapability::Compute {
                memory_gb: 80,
                compute_capability: 9.0,
            },
        });
        topo.add_node(Node {
            id: s(i),
            capability: NodeCapability::Switch { ports: 32 },
        });
    }
    topo.add_link(link(c(0), s(0), InterconnectClass::ClassA, 0.8, 0.1))
        .unwrap();
    topo.add_link(link(s(0), c(1), InterconnectClass::ClassA, 0.8, 0.1))
        .unwrap();
    topo.add_link(link(c(0), s(1), InterconnectClass::ClassC, 3.0, 0.3))
        .unwrap();
    topo.add_link(link(s(1), c(1), InterconnectClass::ClassC, 3.0, 0.3))
        .unwrap();
    topo
}

fn config() -> ControlConfig {
    ControlConfig::builder()
        .fabric_name("test-fabric")
        .tick_interval(Duration::from_millis(20))
        .seed(7)
        .build()
}

fn plane() -> FabricControlPlane {
    let source = Arc::new(SyntheticTelemetry::seeded(7).without_spikes());
    FabricControlPlane::with_topology(config(), source, diamond()).unwrap()
}

/// Steady healthy readings everywhere except one link, which reports a
/// failing transceiver on every tick
struct FailingLinkSource {
    failing: LinkId,
}

#[async_trait]
impl TelemetrySource for FailingLinkSource {
    async fn collect(&self, link: &Link) -> anyhow::Result<RawTelemetry> {
        let raw = if link.id == self.failing {
            RawTelemetry {
                latency: Some(200.0),
                bit_error_rate: Some(1e-3),
                utilization: Some(0.1),
                temperature: Some(95.0),
                crc_error_rate: Some(500.0),
                signal_integrity: Some(0.2),
                timestamp: None,
            }
        } else {
            RawTelemetry {
                latency: Some(1.0),
                bit_error_rate: Some(1e-12),
                utilization: Some(0.3),
                temperature: Some(45.0),
                crc_error_rate: Some(1.0),
                signal_integrity: Some(0.95),
                timestamp: None,
            }
        };
        Ok(raw)
    }

    fn perturb(&self, _link: LinkId, _perturbation: Perturbation) {}

    fn clear_perturbations(&self) {}
}

fn failing_plane(failing: LinkId) -> FabricControlPlane {
    let source = Arc::new(FailingLinkSource { failing });
    FabricControlPlane::with_topology(config(), source, diamond()).unwrap()
}

fn spec(source: NodeId, destination: NodeId) -> JobSpec {
    JobSpec {
        source,
        destination,
        bandwidth_gbps: 50.0,
        priority: JobPriority::High,
        job_type: JobType::Training,
    }
}

#[tokio::test]
async fn test_start_stop_idempotent() {
    let plane = plane();
    assert!(!plane.is_running());
    assert_eq!(plane.stop_loop().await, LoopStatus::NotRunning);

    assert_eq!(plane.start_loop(), LoopStatus::Started);
    assert_eq!(plane.start_loop(), LoopStatus::AlreadyRunning);
    assert!(plane.is_running());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(plane.stop_loop().await, LoopStatus::Stopped);
    assert_eq!(plane.stop_loop().await, LoopStatus::NotRunning);
    assert!(!plane.is_running());
    assert!(plane.status().ticks_completed >= 1);
}

#[tokio::test]
async fn test_rebuild_validates_and_bumps_generation() {
    let source = Arc::new(SyntheticTelemetry::seeded(3));
    let plane = FabricControlPlane::new(config(), source).unwrap();
    assert!(plane.links().is_empty());

    let err = plane
        .rebuild_topology(1, 2, InterconnectClass::ALL.to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::InvalidParameter(_)));
    let err = plane.rebuild_topology(4, 2, Vec::new()).await.unwrap_err();
    assert!(matches!(err, FabricError::InvalidParameter(_)));

    let first = plane
        .rebuild_topology(6, 3, InterconnectClass::ALL.to_vec())
        .await
        .unwrap();
    let second = plane
        .rebuild_topology(6, 3, InterconnectClass::ALL.to_vec())
        .await
        .unwrap();
    assert!(second > first);

    let stats = plane.topology_stats();
    assert_eq!(stats.generation, second);
    assert_eq!(stats.compute_nodes, 6);
    assert_eq!(stats.switches, 3);
    assert!(stats.links >= 6);
    assert!(stats.jobs <= 8);

    let snapshot = plane.current_snapshot();
    assert_eq!(snapshot.generation, second);
    assert_eq!(snapshot.tick, 0);
    assert!(snapshot.links.is_empty());
}

#[tokio::test]
async fn test_rebuild_resumes_running_loop() {
    let source = Arc::new(SyntheticTelemetry::seeded(5));
    let plane = FabricControlPlane::new(config(), source).unwrap();
    plane.start_loop();
    plane
        .rebuild_topology(4, 2, vec![InterconnectClass::ClassB])
        .await
        .unwrap();
    assert!(plane.is_running());
    plane.stop_loop().await;
}

#[tokio::test]
async fn test_add_job_uses_health_optimal_route() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();
    assert_eq!(job.route, vec![c(0), s(0), c(1)]);
    assert_eq!(plane.job(job.id).unwrap().route, job.route);

    let err = plane.add_job(spec(c(0), c(9))).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_healthy_route_is_not_rerouted() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();

    let outcome = plane.reroute(job.id, CostModel::Health, false).await.unwrap();
    assert!(!outcome.rerouted);
    assert_eq!(outcome.new_route, outcome.old_route);
    assert!(plane.routing_decisions(None, 100).is_empty());
}

#[tokio::test]
async fn test_forced_reroute_records_exactly_one_decision() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();

    let outcome = plane.reroute(job.id, CostModel::Health, true).await.unwrap();
    assert!(outcome.rerouted);
    assert_ne!(outcome.new_route, outcome.old_route);
    assert_eq!(outcome.new_route, vec![c(0), s(1), c(1)]);

    let decisions = plane.routing_decisions(None, 100);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].job_id, job.id);
    assert_eq!(decisions[0].old_route, job.route);
    assert_eq!(plane.job(job.id).unwrap().route, outcome.new_route);
    assert_eq!(plane.status().routing_decisions, 1);
}

#[tokio::test]
async fn test_failing_route_is_replaced_once() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();
    for id in job.route_links() {
        plane.update_link_health(&id, 0.1).await.unwrap();
    }

    let analysis = plane.analyze_route(&job.route).unwrap();
    assert!(analysis.should_reroute);
    assert!(analysis.links.iter().all(|l| l.health_score == 0.1));

    let outcome = plane.reroute(job.id, CostModel::Health, false).await.unwrap();
    assert!(outcome.rerouted);
    assert_ne!(outcome.new_route, outcome.old_route);

    let decisions = plane.routing_decisions(None, 100);
    assert_eq!(decisions.len(), 1);
    assert_ne!(decisions[0].new_route, decisions[0].old_route);

    // Already on the healthy path; nothing further to do
    let again = plane.reroute(job.id, CostModel::Health, false).await.unwrap();
    assert!(!again.rerouted);
    assert_eq!(plane.routing_decisions(None, 100).len(), 1);
}

#[tokio::test]
async fn test_tick_reroutes_job_off_failing_link() {
    let plane = failing_plane(LinkId::new(c(0), s(0)));
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();
    assert_eq!(job.route, vec![c(0), s(0), c(1)]);

    let report = plane.tick_once().await;
    assert_eq!(report.jobs_evaluated, 1);
    assert_eq!(report.reroutes, 1);
    assert!(plane.link(&LinkId::new(c(0), s(0))).unwrap().health_score < 0.6);
    assert_eq!(plane.job(job.id).unwrap().route, vec![c(0), s(1), c(1)]);

    let decisions = plane.routing_decisions(None, 100);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].old_route, job.route);
    assert_eq!(decisions[0].new_route, vec![c(0), s(1), c(1)]);
    assert!(plane.metrics().encode().unwrap().contains("fabric_reroutes_total 1"));
    assert_eq!(
        plane.probes().status(fabric_core::probes::components::ROUTING).await,
        Some(fabric_core::ProbeStatus::Healthy)
    );

    let report = plane.tick_once().await;
    assert_eq!(report.reroutes, 0);
    assert_eq!(plane.routing_decisions(None, 100).len(), 1);
    assert_eq!(plane.job(job.id).unwrap().route, vec![c(0), s(1), c(1)]);
}

#[tokio::test]
async fn test_alerts_filter_by_severity() {
    let failing = LinkId::new(c(0), s(0));
    let plane = failing_plane(failing);
    let report = plane.tick_once().await;
    assert_eq!(report.alerts, 1);

    let critical = plane.alerts(None, Some(AlertSeverity::Critical));
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].link_id, failing);
    assert!(plane.alerts(None, Some(AlertSeverity::Warning)).is_empty());
    assert!(plane.alerts(None, Some(AlertSeverity::Info)).is_empty());
    assert_eq!(plane.alerts(Some(Duration::from_secs(60)), None).len(), 1);
    assert_eq!(plane.status().alerts, 1);
}

#[tokio::test]
async fn test_reroute_unknown_job() {
    let plane = plane();
    let err = plane
        .reroute(fabric_core::JobId(99), CostModel::Health, false)
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::JobNotFound(_)));
}

#[tokio::test]
async fn test_fault_lifecycle_drives_reroute() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();
    let target = LinkId::new(c(0), s(0));

    let event = plane
        .inject_fault(
            FaultKind::LinkDegradation,
            FaultParams::targeting(target)
                .with_severity(0.8)
                .with_duration(Duration::from_secs(120)),
        )
        .await
        .unwrap();
    assert_eq!(event.targets.len(), 1);
    assert!((plane.link(&target).unwrap().health_score - 0.2).abs() < 1e-9);
    assert_eq!(plane.active_faults().len(), 1);

    let analysis = plane.analyze_route(&job.route).unwrap();
    assert!(analysis.should_reroute);

    let outcome = plane.reroute(job.id, CostModel::Health, false).await.unwrap();
    assert!(outcome.rerouted);
    assert_eq!(outcome.new_route, vec![c(0), s(1), c(1)]);

    assert_eq!(plane.stop_all_faults().await, 1);
    assert!(plane.active_faults().is_empty());
    assert!(plane.links().iter().all(|l| l.health_score == 1.0));
}

#[tokio::test]
async fn test_fault_rejects_unknown_target() {
    let plane = plane();
    let err = plane
        .inject_fault(
            FaultKind::SuddenFailure,
            FaultParams::targeting(LinkId::new(c(0), c(1))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::LinkNotFound(_)));
}

#[tokio::test]
async fn test_tick_publishes_snapshot() {
    let plane = plane();
    let mut rx = plane.subscribe();

    let report = plane.tick_once().await;
    assert_eq!(report.tick, 1);
    assert_eq!(report.links_scored, 4);
    assert_eq!(report.link_errors, 0);

    rx.changed().await.unwrap();
    let snapshot = rx.borrow().clone();
    assert_eq!(snapshot.tick, 1);
    assert_eq!(snapshot.links.len(), 4);
    for (id, entry) in &snapshot.links {
        let score = entry.health.overall_score;
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(plane.link(id).unwrap().health_score, score);
    }
    assert_eq!(plane.current_snapshot().tick, 1);
}

#[tokio::test]
async fn test_analyze_route() {
    let plane = plane();
    let job = plane.add_job(spec(c(0), c(1))).await.unwrap();

    let analysis = plane.analyze_route(&[c(0), s(0), c(1)]).unwrap();
    assert_eq!(analysis.links.len(), 2);
    assert_eq!(analysis.metrics.hops, 2);
    assert_eq!(analysis.jobs, vec![job.id]);
    assert!(!analysis.should_reroute);

    assert!(matches!(
        plane.analyze_route(&[c(0)]).unwrap_err(),
        FabricError::InvalidParameter(_)
    ));
    assert!(matches!(
        plane.analyze_route(&[c(0), c(1)]).unwrap_err(),
        FabricError::LinkNotFound(_)
    ));
    assert!(matches!(
        plane.analyze_route(&[c(0), s(7)]).unwrap_err(),
        FabricError::NodeNotFound(_)
    ));
}

#[tokio::test]
async fn test_optimize_route_models() {
    let plane = plane();
    let latency = plane.optimize_route(c(0), c(1), CostModel::Latency).unwrap();
    assert_eq!(latency.route, vec![c(0), s(0), c(1)]);
    assert!(latency.alternatives.len() <= 3);

    let trivial = plane.optimize_route(c(0), c(0), CostModel::Health).unwrap();
    assert_eq!(trivial.route, vec![c(0)]);
    assert_eq!(trivial.metrics.hops, 0);
}

#[tokio::test]
async fn test_forecast_needs_history() {
    let plane = plane();
    let id = LinkId::new(c(0), s(0));

    assert!(matches!(
        plane.forecast(id, 5).unwrap_err(),
        FabricError::InsufficientData { .. }
    ));
    assert!(matches!(
        plane.forecast(LinkId::new(c(0), c(1)), 5).unwrap_err(),
        FabricError::LinkNotFound(_)
    ));

    for _ in 0..12 {
        plane.tick_once().await;
    }
    let forecast = plane.forecast(id, 5).unwrap();
    assert_eq!(forecast.horizon, 5);
    assert_eq!(forecast.data_points, 12);

    let fleet = plane.fleet_forecast(5).unwrap();
    assert_eq!(fleet.links_analyzed, 4);

    for horizon in [0, MAX_FORECAST_HORIZON + 1, usize::MAX] {
        assert!(matches!(
            plane.forecast(id, horizon).unwrap_err(),
            FabricError::InvalidParameter(_)
        ));
        assert!(matches!(
            plane.fleet_forecast(horizon).unwrap_err(),
            FabricError::InvalidParameter(_)
        ));
    }
}

#[tokio::test]
async fn test_status_counts() {
    let plane = plane();
    plane.add_job(spec(c(0), c(1))).await.unwrap();
    plane.tick_once().await;

    let status = plane.status();
    assert_eq!(status.fabric, "test-fabric");
    assert!(!status.running);
    assert_eq!(status.links, 4);
    assert_eq!(status.nodes, 4);
    assert_eq!(status.jobs, 1);
    assert_eq!(status.ticks_completed, 1);
    assert_eq!(status.active_faults, 0);
}
