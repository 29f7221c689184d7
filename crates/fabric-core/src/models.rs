//! Core data models for the fabric topology

use crate::error::{FabricError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a node in the fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Compute,
    Switch,
}

impl NodeRole {
    fn prefix(self) -> char {
        match self {
            NodeRole::Compute => 'C',
            NodeRole::Switch => 'S',
        }
    }
}

/// Node identifier, rendered as `C<n>` for compute nodes and `S<n>` for switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId {
    pub role: NodeRole,
    pub index: u32,
}

impl NodeId {
    pub fn compute(index: u32) -> Self {
        Self {
            role: NodeRole::Compute,
            index,
        }
    }

    pub fn switch(index: u32) -> Self {
        Self {
            role: NodeRole::Switch,
            index,
        }
    }

    pub fn is_compute(&self) -> bool {
        self.role == NodeRole::Compute
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.index)
    }
}

impl FromStr for NodeId {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let role = match chars.next() {
            Some('C') => NodeRole::Compute,
            Some('S') => NodeRole::Switch,
            _ => return Err(FabricError::NodeNotFound(s.to_string())),
        };
        let index = chars
            .as_str()
            .parse::<u32>()
            .map_err(|_| FabricError::NodeNotFound(s.to_string()))?;
        Ok(Self { role, index })
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = FabricError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Link identifier derived from the unordered endpoint pair.
///
/// Endpoints are stored in canonical order so `LinkId::new(a, b) == LinkId::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LinkId {
    lo: NodeId,
    hi: NodeId,
}

impl LinkId {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.lo, self.hi)
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.lo == node || self.hi == node
    }

    pub fn shares_endpoint(&self, other: &LinkId) -> bool {
        self != other && (other.touches(self.lo) || other.touches(self.hi))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

impl FromStr for LinkId {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| FabricError::LinkNotFound(s.to_string()))?;
        let a = a.parse().map_err(|_| FabricError::LinkNotFound(s.to_string()))?;
        let b = b.parse().map_err(|_| FabricError::LinkNotFound(s.to_string()))?;
        Ok(Self::new(a, b))
    }
}

impl From<LinkId> for String {
    fn from(id: LinkId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for LinkId {
    type Error = FabricError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Physical-layer interconnect class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterconnectClass {
    /// High bandwidth, lowest latency, cheapest per bit
    ClassA,
    ClassB,
    /// Commodity serial links, costliest per bit
    ClassC,
}

/// Static profile of an interconnect class on a given link role
#[derive(Debug, Clone, Copy)]
pub struct ClassProfile {
    pub bandwidths_gbps: &'static [f64],
    pub latency_range: (f64, f64),
}

impl InterconnectClass {
    pub const ALL: [InterconnectClass; 3] = [Self::ClassA, Self::ClassB, Self::ClassC];

    /// Relative energy cost per bit
    pub fn energy_weight(self) -> f64 {
        match self {
            Self::ClassA => 1.0,
            Self::ClassB => 1.2,
            Self::ClassC => 1.5,
        }
    }

    /// Profile for compute-to-switch links
    pub fn compute_profile(self) -> ClassProfile {
        match self {
            Self::ClassA => ClassProfile {
                bandwidths_gbps: &[300.0, 400.0, 600.0],
                latency_range: (0.5, 1.0),
            },
            Self::ClassB => ClassProfile {
                bandwidths_gbps: &[200.0, 400.0],
                latency_range: (1.0, 2.0),
            },
            Self::ClassC => ClassProfile {
                bandwidths_gbps: &[16.0, 32.0, 64.0],
                latency_range: (2.0, 5.0),
            },
        }
    }

    /// Profile for switch-to-switch links. ClassA is never used between switches.
    pub fn switch_profile(self) -> Option<ClassProfile> {
        match self {
            Self::ClassA => None,
            Self::ClassB => Some(ClassProfile {
                bandwidths_gbps: &[400.0, 800.0],
                latency_range: (0.8, 1.5),
            }),
            Self::ClassC => Some(ClassProfile {
                bandwidths_gbps: &[32.0, 64.0],
                latency_range: (1.5, 3.0),
            }),
        }
    }
}

impl fmt::Display for InterconnectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassA => write!(f, "ClassA"),
            Self::ClassB => write!(f, "ClassB"),
            Self::ClassC => write!(f, "ClassC"),
        }
    }
}

impl FromStr for InterconnectClass {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "classa" => Ok(Self::ClassA),
            "b" | "classb" => Ok(Self::ClassB),
            "c" | "classc" => Ok(Self::ClassC),
            other => Err(FabricError::invalid(format!(
                "unknown interconnect class '{other}'"
            ))),
        }
    }
}

/// Static capability attributes of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeCapability {
    Compute { memory_gb: u32, compute_capability: f64 },
    Switch { ports: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub capability: NodeCapability,
}

impl Node {
    pub fn role(&self) -> NodeRole {
        self.id.role
    }
}

/// An undirected fabric link with its mutable health and utilization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub class: InterconnectClass,
    pub bandwidth_gbps: f64,
    pub base_latency: f64,
    pub utilization: f64,
    pub health_score: f64,
}

impl Link {
    pub fn new(id: LinkId, class: InterconnectClass, bandwidth_gbps: f64, base_latency: f64) -> Self {
        Self {
            id,
            class,
            bandwidth_gbps,
            base_latency,
            utilization: 0.0,
            health_score: 1.0,
        }
    }

    /// Latency under the current load
    pub fn effective_latency(&self) -> f64 {
        self.base_latency * (1.0 + self.utilization)
    }
}

/// Clamp into [0,1], mapping NaN to 0
pub fn unit_clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix("job_")
            .and_then(|n| n.parse().ok())
            .map(JobId)
            .ok_or_else(|| FabricError::JobNotFound(s.to_string()))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = FabricError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Training,
    Inference,
    DataTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High,
    Medium,
    Low,
}

/// A transfer running over a route through the fabric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source: NodeId,
    pub destination: NodeId,
    pub route: Vec<NodeId>,
    pub bandwidth_gbps: f64,
    pub priority: JobPriority,
    pub job_type: JobType,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Links traversed by the current route, in order
    pub fn route_links(&self) -> Vec<LinkId> {
        route_links(&self.route)
    }

    pub fn uses_link(&self, link: &LinkId) -> bool {
        self.route
            .windows(2)
            .any(|hop| LinkId::new(hop[0], hop[1]) == *link)
    }
}

pub fn route_links(route: &[NodeId]) -> Vec<LinkId> {
    route
        .windows(2)
        .map(|hop| LinkId::new(hop[0], hop[1]))
        .collect()
}

/// Parameters for registering a new job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub source: NodeId,
    pub destination: NodeId,
    pub bandwidth_gbps: f64,
    pub priority: JobPriority,
    pub job_type: JobType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trip_and_order() {
        let c = NodeId::compute(3);
        let s = NodeId::switch(1);
        assert_eq!(c.to_string(), "C3");
        assert_eq!("S1".parse::<NodeId>().unwrap(), s);
        assert!(c < s);
        assert!("X1".parse::<NodeId>().is_err());
        assert!("C".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_link_id_is_order_independent() {
        let a = NodeId::compute(2);
        let b = NodeId::switch(0);
        assert_eq!(LinkId::new(a, b), LinkId::new(b, a));
        assert_eq!(LinkId::new(b, a).to_string(), "C2-S0");
        assert_eq!("S0-C2".parse::<LinkId>().unwrap(), LinkId::new(a, b));
    }

    #[test]
    fn test_link_shares_endpoint() {
        let l1 = LinkId::new(NodeId::compute(0), NodeId::switch(0));
        let l2 = LinkId::new(NodeId::compute(1), NodeId::switch(0));
        let l3 = LinkId::new(NodeId::compute(2), NodeId::switch(1));
        assert!(l1.shares_endpoint(&l2));
        assert!(!l1.shares_endpoint(&l3));
        assert!(!l1.shares_endpoint(&l1));
    }

    #[test]
    fn test_class_parsing_and_weights() {
        assert_eq!("A".parse::<InterconnectClass>().unwrap(), InterconnectClass::ClassA);
        assert_eq!("classC".parse::<InterconnectClass>().unwrap(), InterconnectClass::ClassC);
        assert!("D".parse::<InterconnectClass>().is_err());
        assert!(InterconnectClass::ClassA.energy_weight() < InterconnectClass::ClassC.energy_weight());
        assert!(InterconnectClass::ClassA.switch_profile().is_none());
    }

    #[test]
    fn test_job_uses_link_either_direction() {
        let route = vec![NodeId::compute(0), NodeId::switch(1), NodeId::compute(4)];
        let job = Job {
            id: JobId(1),
            source: route[0],
            destination: route[2],
            route,
            bandwidth_gbps: 50.0,
            priority: JobPriority::High,
            job_type: JobType::Training,
            created_at: Utc::now(),
        };
        assert!(job.uses_link(&LinkId::new(NodeId::switch(1), NodeId::compute(0))));
        assert!(!job.uses_link(&LinkId::new(NodeId::switch(1), NodeId::compute(2))));
        assert_eq!(job.route_links().len(), 2);
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let json = serde_json::to_string(&LinkId::new(NodeId::switch(0), NodeId::compute(5))).unwrap();
        assert_eq!(json, "\"C5-S0\"");
        let job: JobId = serde_json::from_str("\"job_7\"").unwrap();
        assert_eq!(job, JobId(7));
    }

    #[test]
    fn test_unit_clamp() {
        assert_eq!(unit_clamp(f64::NAN), 0.0);
        assert_eq!(unit_clamp(-3.0), 0.0);
        assert_eq!(unit_clamp(7.0), 1.0);
        assert_eq!(unit_clamp(f64::INFINITY), 1.0);
    }
}
