//! Control loop, published snapshots and the control plane facade

mod config;
mod plane;
mod snapshot;
mod tick;

pub use config::{ControlConfig, ControlConfigBuilder};
pub use plane::{
    ControlStatus, FabricControlPlane, LinkBreakdown, LoopStatus, RerouteOutcome, RouteAnalysis,
    RouteOptimization,
};
pub use snapshot::{LinkSnapshot, Snapshot, TickReport};
