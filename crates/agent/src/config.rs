//! Agent configuration

use anyhow::{Context, Result};
use fabric_core::{
    forecast::ForecasterKind, routing::CostModel, topology::BuildParams, ControlConfig,
    InterconnectClass,
};
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, read from `FABRIC_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Fabric name attached to structured events
    #[serde(default = "default_fabric_name")]
    pub fabric_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Control loop tick interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Compute nodes in the bootstrap topology
    #[serde(default = "default_compute_nodes")]
    pub compute_nodes: usize,

    /// Switches in the bootstrap topology
    #[serde(default = "default_switches")]
    pub switches: usize,

    /// Comma-separated interconnect classes, e.g. `A,B,C`
    #[serde(default = "default_classes")]
    pub classes: String,

    #[serde(default = "default_reroute_threshold")]
    pub reroute_threshold: f64,

    #[serde(default = "default_reroute_model")]
    pub reroute_model: String,

    /// `linear` or `holt`
    #[serde(default = "default_forecaster")]
    pub forecaster: String,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_fabric_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "fabric".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_tick_interval() -> u64 {
    3
}

fn default_compute_nodes() -> usize {
    8
}

fn default_switches() -> usize {
    4
}

fn default_classes() -> String {
    "A,B,C".to_string()
}

fn default_reroute_threshold() -> f64 {
    0.6
}

fn default_reroute_model() -> String {
    "health".to_string()
}

fn default_forecaster() -> String {
    "linear".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            fabric_name: default_fabric_name(),
            api_port: default_api_port(),
            tick_interval_secs: default_tick_interval(),
            compute_nodes: default_compute_nodes(),
            switches: default_switches(),
            classes: default_classes(),
            reroute_threshold: default_reroute_threshold(),
            reroute_model: default_reroute_model(),
            forecaster: default_forecaster(),
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("FABRIC").try_parsing(true))
            .build()?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("invalid FABRIC_* configuration")?;
        agent.validate()?;
        Ok(agent)
    }

    /// Reject values the control plane would refuse later
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            anyhow::bail!("FABRIC_TICK_INTERVAL_SECS must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.reroute_threshold) {
            anyhow::bail!(
                "FABRIC_REROUTE_THRESHOLD {} outside [0, 1]",
                self.reroute_threshold
            );
        }
        self.build_params()?.validate()?;
        self.control_config()?;
        Ok(())
    }

    pub fn interconnect_classes(&self) -> Result<Vec<InterconnectClass>> {
        self.classes
            .split(',')
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<InterconnectClass>().map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid FABRIC_CLASSES '{}'", self.classes))
    }

    pub fn build_params(&self) -> Result<BuildParams> {
        Ok(BuildParams::new(
            self.compute_nodes,
            self.switches,
            self.interconnect_classes()?,
        ))
    }

    pub fn control_config(&self) -> Result<ControlConfig> {
        let forecaster: ForecasterKind = self
            .forecaster
            .parse()
            .with_context(|| format!("invalid FABRIC_FORECASTER '{}'", self.forecaster))?;
        let reroute_model: CostModel = self
            .reroute_model
            .parse()
            .with_context(|| format!("invalid FABRIC_REROUTE_MODEL '{}'", self.reroute_model))?;

        let mut builder = ControlConfig::builder()
            .fabric_name(self.fabric_name.clone())
            .tick_interval(Duration::from_secs(self.tick_interval_secs))
            .reroute_threshold(self.reroute_threshold)
            .reroute_model(reroute_model)
            .forecaster(forecaster);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        let params = config.build_params().unwrap();
        assert_eq!(params.compute_nodes, 8);
        assert_eq!(params.classes, InterconnectClass::ALL.to_vec());
        assert_eq!(
            config.control_config().unwrap().tick_interval,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = AgentConfig {
            classes: "A,Z".to_string(),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            compute_nodes: 500,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AgentConfig {
            forecaster: "arima".to_string(),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_flows_into_control_config() {
        let config = AgentConfig {
            seed: Some(42),
            ..AgentConfig::default()
        };
        assert_eq!(config.control_config().unwrap().seed, Some(42));
    }
}
