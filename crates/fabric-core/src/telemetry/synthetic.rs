//! Synthetic telemetry source
//!
//! Generates correlated link metrics from the link's interconnect class:
//! latency and temperature rise with utilization and degradation, bit error
//! rate rises with temperature, CRC errors follow the bit error rate, and
//! signal integrity is derived from both. Faults register perturbations that
//! keep the generated metrics consistent with the injected condition until
//! they expire.

use super::{Perturbation, PerturbationKind, RawTelemetry, TelemetrySource};
use crate::models::{InterconnectClass, Link, LinkId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Degradation never exceeds this level, so a failed link still reports
const MAX_DEGRADATION: f64 = 0.8;
const SPIKE_PROBABILITY: f64 = 0.05;
const BASE_CRC_RATE: f64 = 5.0;

struct ClassBaseline {
    bit_error_rate: f64,
    temperature: f64,
    utilization: f64,
}

fn baseline(class: InterconnectClass) -> ClassBaseline {
    match class {
        InterconnectClass::ClassA => ClassBaseline {
            bit_error_rate: 1e-11,
            temperature: 45.0,
            utilization: 0.3,
        },
        InterconnectClass::ClassB => ClassBaseline {
            bit_error_rate: 5e-11,
            temperature: 50.0,
            utilization: 0.4,
        },
        InterconnectClass::ClassC => ClassBaseline {
            bit_error_rate: 1e-10,
            temperature: 55.0,
            utilization: 0.5,
        },
    }
}

#[derive(Debug, Clone)]
struct ActivePerturbation {
    kind: PerturbationKind,
    severity: f64,
    expires_at: DateTime<Utc>,
}

/// Stochastic [`TelemetrySource`] used when no hardware counters are available
pub struct SyntheticTelemetry {
    rng: Mutex<StdRng>,
    perturbations: Mutex<HashMap<LinkId, Vec<ActivePerturbation>>>,
    spike_probability: f64,
}

impl Default for SyntheticTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticTelemetry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic source for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            perturbations: Mutex::new(HashMap::new()),
            spike_probability: SPIKE_PROBABILITY,
        }
    }

    /// Disable transient spikes
    pub fn without_spikes(mut self) -> Self {
        self.spike_probability = 0.0;
        self
    }

    /// Strongest unexpired perturbation of `kind` on `link`, pruning expired entries
    pub fn perturbation_level(&self, link: &LinkId, kind: PerturbationKind) -> f64 {
        let now = Utc::now();
        let mut perturbations = self.perturbations.lock();
        let Some(active) = perturbations.get_mut(link) else {
            return 0.0;
        };
        active.retain(|p| p.expires_at > now);
        let level = active
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.severity)
            .fold(0.0, f64::max);
        if active.is_empty() {
            perturbations.remove(link);
        }
        level
    }

    pub fn has_perturbations(&self) -> bool {
        !self.perturbations.lock().is_empty()
    }

    fn generate(&self, link: &Link, degradation: f64, congestion: f64) -> RawTelemetry {
        let base = baseline(link.class);
        let mut rng = self.rng.lock();

        let workload = rng.gen_range(0.7..1.3);
        let utilization =
            (base.utilization * workload + congestion + gauss(&mut rng, 0.05)).clamp(0.0, 1.0);

        let degradation = (degradation + gauss(&mut rng, 0.02)).clamp(0.0, MAX_DEGRADATION);

        let mut latency = link.base_latency * (1.0 + utilization * 2.0 + degradation * 3.0);
        latency = (latency + gauss(&mut rng, latency * 0.1)).max(0.1);

        let temperature = (base.temperature
            + gauss(&mut rng, 5.0)
            + utilization * 15.0
            + degradation * 20.0)
            .clamp(10.0, 100.0);

        let temp_factor = 1.0 + (temperature - 25.0) * 0.01;
        let mut ber = base.bit_error_rate * temp_factor * (1.0 + degradation * 10.0);
        ber = (ber + gauss(&mut rng, ber * 0.2)).max(1e-15);

        let crc_multiplier = (ber / base.bit_error_rate) * (1.0 + utilization);
        let mut crc = BASE_CRC_RATE * crc_multiplier * (1.0 + degradation * 5.0);
        crc = (crc + gauss(&mut rng, crc * 0.3)).max(0.0);

        if rng.gen::<f64>() < self.spike_probability {
            let spike = rng.gen_range(1.5..3.0);
            latency *= spike;
            crc *= spike;
        }

        RawTelemetry {
            latency: Some(latency),
            bit_error_rate: Some(ber),
            utilization: Some(utilization),
            temperature: Some(temperature),
            crc_error_rate: Some(crc),
            signal_integrity: Some(signal_integrity(ber, temperature)),
            timestamp: Some(Utc::now()),
        }
    }
}

#[async_trait]
impl TelemetrySource for SyntheticTelemetry {
    async fn collect(&self, link: &Link) -> anyhow::Result<RawTelemetry> {
        let degradation = self.perturbation_level(&link.id, PerturbationKind::Degradation);
        let congestion = self.perturbation_level(&link.id, PerturbationKind::Congestion);
        Ok(self.generate(link, degradation, congestion))
    }

    fn perturb(&self, link: LinkId, perturbation: Perturbation) {
        let duration = chrono::Duration::from_std(perturbation.duration)
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.perturbations
            .lock()
            .entry(link)
            .or_default()
            .push(ActivePerturbation {
                kind: perturbation.kind,
                severity: perturbation.severity.clamp(0.0, 1.0),
                expires_at: Utc::now() + duration,
            });
    }

    fn clear_perturbations(&self) {
        self.perturbations.lock().clear();
    }
}

/// Signal integrity falls with both bit error rate and temperature
fn signal_integrity(ber: f64, temperature: f64) -> f64 {
    let ber_factor = (1.0 - ((ber.abs() + 1e-15).log10() + 10.0) / 5.0).max(0.1);
    let temp_factor = (1.0 - (temperature - 25.0) / 75.0).max(0.1);
    ber_factor.min(temp_factor).min(1.0)
}

/// Zero-mean normal noise (Box-Muller)
fn gauss(rng: &mut StdRng, sigma: f64) -> f64 {
    if sigma <= 0.0 || !sigma.is_finite() {
        return 0.0;
    }
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeId;
    use crate::telemetry::TelemetrySample;
    use std::time::Duration;

    fn link(class: InterconnectClass) -> Link {
        Link::new(
            LinkId::new(NodeId::compute(0), NodeId::switch(0)),
            class,
            400.0,
            1.0,
        )
    }

    async fn mean_latency(source: &SyntheticTelemetry, link: &Link, n: usize) -> f64 {
        let mut total = 0.0;
        for _ in 0..n {
            let raw = source.collect(link).await.unwrap();
            total += TelemetrySample::from_raw(&raw).latency;
        }
        total / n as f64
    }

    #[tokio::test]
    async fn test_samples_are_complete_and_in_range() {
        let source = SyntheticTelemetry::seeded(7);
        let link = link(InterconnectClass::ClassB);
        for _ in 0..50 {
            let raw = source.collect(&link).await.unwrap();
            assert!(raw.latency.unwrap() >= 0.1);
            let util = raw.utilization.unwrap();
            assert!((0.0..=1.0).contains(&util));
            let temp = raw.temperature.unwrap();
            assert!((10.0..=100.0).contains(&temp));
            let si = raw.signal_integrity.unwrap();
            assert!((0.0..=1.0).contains(&si));
            assert!(raw.crc_error_rate.unwrap() >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_degradation_raises_latency() {
        let link = link(InterconnectClass::ClassA);
        let healthy = SyntheticTelemetry::seeded(11).without_spikes();
        let degraded = SyntheticTelemetry::seeded(11).without_spikes();
        degraded.perturb(
            link.id,
            Perturbation {
                kind: PerturbationKind::Degradation,
                severity: 0.7,
                duration: Duration::from_secs(120),
            },
        );

        let base = mean_latency(&healthy, &link, 40).await;
        let hurt = mean_latency(&degraded, &link, 40).await;
        assert!(hurt > base * 1.5, "degraded {hurt} vs healthy {base}");
    }

    #[test]
    fn test_perturbations_expire_and_clear() {
        let source = SyntheticTelemetry::seeded(3);
        let id = link(InterconnectClass::ClassC).id;
        source.perturb(
            id,
            Perturbation {
                kind: PerturbationKind::Congestion,
                severity: 0.4,
                duration: Duration::ZERO,
            },
        );
        assert_eq!(source.perturbation_level(&id, PerturbationKind::Congestion), 0.0);
        assert!(!source.has_perturbations());

        source.perturb(
            id,
            Perturbation {
                kind: PerturbationKind::Congestion,
                severity: 0.4,
                duration: Duration::from_secs(60),
            },
        );
        assert_eq!(source.perturbation_level(&id, PerturbationKind::Congestion), 0.4);
        assert_eq!(source.perturbation_level(&id, PerturbationKind::Degradation), 0.0);
        source.clear_perturbations();
        assert!(!source.has_perturbations());
    }

    #[test]
    fn test_signal_integrity_drops_with_heat() {
        assert!(signal_integrity(1e-11, 30.0) > signal_integrity(1e-11, 90.0));
        assert!(signal_integrity(1e-8, 30.0) <= 0.6 + 1e-9);
    }
}
