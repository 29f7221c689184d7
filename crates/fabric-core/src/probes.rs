//! Component probes for liveness and readiness endpoints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    /// Working with reduced coverage, e.g. some links failed to report
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentProbe {
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentProbe {
    fn with(status: ProbeStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ProbeStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ProbeStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ProbeStatus::Unhealthy, Some(message.into()))
    }
}

/// Aggregate liveness: the worst component status wins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessReport {
    pub status: ProbeStatus,
    pub components: BTreeMap<String, ComponentProbe>,
}

impl LivenessReport {
    fn from_components(components: BTreeMap<String, ComponentProbe>) -> Self {
        let status = components
            .values()
            .map(|c| c.status)
            .fold(ProbeStatus::Healthy, |worst, s| match (worst, s) {
                (ProbeStatus::Unhealthy, _) | (_, ProbeStatus::Unhealthy) => ProbeStatus::Unhealthy,
                (ProbeStatus::Degraded, _) | (_, ProbeStatus::Degraded) => ProbeStatus::Degraded,
                _ => ProbeStatus::Healthy,
            });
        Self { status, components }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names tracked by the control plane
pub mod components {
    pub const CONTROL_LOOP: &str = "control_loop";
    pub const TELEMETRY: &str = "telemetry";
    pub const ROUTING: &str = "routing";

    pub const ALL: [&str; 3] = [CONTROL_LOOP, TELEMETRY, ROUTING];
}

/// Shared registry of component probes; clones share state
#[derive(Debug, Clone)]
pub struct ProbeRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentProbe>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRegistry {
    /// Registry with every control plane component marked healthy
    pub fn new() -> Self {
        let components = components::ALL
            .iter()
            .map(|name| (name.to_string(), ComponentProbe::healthy()))
            .collect();
        Self {
            components: Arc::new(RwLock::new(components)),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn update(&self, name: &str, probe: ComponentProbe) {
        self.components.write().await.insert(name.to_string(), probe);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentProbe::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentProbe::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentProbe::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn status(&self, name: &str) -> Option<ProbeStatus> {
        self.components.read().await.get(name).map(|c| c.status)
    }

    pub async fn liveness(&self) -> LivenessReport {
        LivenessReport::from_components(self.components.read().await.clone())
    }

    pub async fn readiness(&self) -> ReadinessReport {
        if !*self.ready.read().await {
            return ReadinessReport {
                ready: false,
                reason: Some("Control plane not yet bootstrapped".to_string()),
            };
        }
        let liveness = self.liveness().await;
        if liveness.status == ProbeStatus::Unhealthy {
            let failing: Vec<&str> = liveness
                .components
                .iter()
                .filter(|(_, c)| c.status == ProbeStatus::Unhealthy)
                .map(|(name, _)| name.as_str())
                .collect();
            return ReadinessReport {
                ready: false,
                reason: Some(format!("Unhealthy components: {}", failing.join(", "))),
            };
        }
        ReadinessReport {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_healthy_but_not_ready() {
        let probes = ProbeRegistry::new();
        let live = probes.liveness().await;
        assert_eq!(live.status, ProbeStatus::Healthy);
        assert_eq!(live.components.len(), 3);
        assert!(!probes.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let probes = ProbeRegistry::new();
        probes.set_degraded(components::TELEMETRY, "2 of 10 links failed").await;
        assert_eq!(probes.liveness().await.status, ProbeStatus::Degraded);

        probes.set_unhealthy(components::ROUTING, "no path").await;
        assert_eq!(probes.liveness().await.status, ProbeStatus::Unhealthy);

        probes.set_healthy(components::ROUTING).await;
        probes.set_healthy(components::TELEMETRY).await;
        assert_eq!(probes.liveness().await.status, ProbeStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_requires_bootstrap_and_no_failures() {
        let probes = ProbeRegistry::new();
        probes.set_ready(true).await;
        assert!(probes.readiness().await.ready);

        probes.set_unhealthy(components::TELEMETRY, "all links failed").await;
        let ready = probes.readiness().await;
        assert!(!ready.ready);
        assert!(ready.reason.unwrap().contains("telemetry"));
    }
}
