//! Adaptive routing control plane for an interconnect fabric
//!
//! This crate provides the core functionality for:
//! - Fabric topology modelling and generation
//! - Link telemetry collection and health scoring
//! - Anomaly detection and alerting
//! - Cost-model route optimization and automatic rerouting
//! - Fault injection and health forecasting
//! - Probes and observability

pub mod anomaly;
pub mod control;
pub mod error;
pub mod faults;
pub mod forecast;
pub mod journal;
pub mod models;
pub mod observability;
pub mod probes;
pub mod routing;
pub mod scoring;
pub mod stats;
pub mod telemetry;
pub mod topology;

pub use control::{ControlConfig, FabricControlPlane, LoopStatus, Snapshot, TickReport};
pub use error::{FabricError, Result};
pub use models::*;
pub use observability::{EventLogger, FabricMetrics};
pub use probes::{ComponentProbe, LivenessReport, ProbeRegistry, ProbeStatus, ReadinessReport};
