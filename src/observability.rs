// Metrics surface: counters and histograms emitted through the `metrics`
// crate's global recorder, the same facade `api/mod.rs` wires a Prometheus
// exporter onto — the binary installs the exporter once at startup and
// every call site here stays exporter-agnostic. Also tracks per-dependency
// health status for the `/healthz`-style summary the API exposes.

use crate::sources::SourceHealthTracker;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;

pub fn record_opportunity_detected(strategy: &str) {
    counter!("opportunities_detected_total", "strategy" => strategy.to_string()).increment(1);
}

pub fn record_trade_filled(strategy: &str) {
    counter!("trades_filled_total", "strategy" => strategy.to_string()).increment(1);
}

pub fn record_trade_closed(strategy: &str, reason: &str) {
    counter!("trades_closed_total", "strategy" => strategy.to_string(), "reason" => reason.to_string()).increment(1);
}

pub fn record_error(kind: &str) {
    counter!("errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_gate_denial(reason: &str) {
    counter!("gate_denials_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_source_call(source: &str, status: &str) {
    counter!("source_calls_total", "source" => source.to_string(), "status" => status.to_string()).increment(1);
}

pub fn record_cycle_duration_ms(millis: f64) {
    histogram!("cycle_duration_ms").record(millis);
}

/// RAII latency recorder: record the elapsed time under `name` when dropped,
/// so a fallible early-return still reports its partial latency.
pub struct LatencyTimer {
    name: &'static str,
    started: Instant,
}

impl LatencyTimer {
    pub fn start(name: &'static str) -> Self {
        LatencyTimer { name, started: Instant::now() }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!("operation_duration_ms", "operation" => self.name).record(self.started.elapsed().as_secs_f64() * 1000.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Healthy,
    Degraded,
    Down,
}

impl DependencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyStatus::Healthy => "healthy",
            DependencyStatus::Degraded => "degraded",
            DependencyStatus::Down => "down",
        }
    }
}

/// Aggregates every source's rolling-window health tracker into a single
/// snapshot for the health endpoint and the persisted snapshot file.
pub struct HealthRegistry {
    trackers: RwLock<HashMap<String, SourceHealthTracker>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        HealthRegistry { trackers: RwLock::new(HashMap::new()) }
    }

    pub fn record(&self, source: &str, ok: bool) {
        let mut trackers = self.trackers.write();
        trackers.entry(source.to_string()).or_insert_with(SourceHealthTracker::new).record(ok);
    }

    pub fn snapshot(&self) -> Vec<(String, DependencyStatus)> {
        let trackers = self.trackers.read();
        trackers
            .iter()
            .map(|(name, tracker)| {
                let status = match tracker.status(false) {
                    "healthy" => DependencyStatus::Healthy,
                    "degraded" => DependencyStatus::Degraded,
                    _ => DependencyStatus::Down,
                };
                (name.clone(), status)
            })
            .collect()
    }

    pub fn overall(&self) -> DependencyStatus {
        let snap = self.snapshot();
        if snap.is_empty() {
            return DependencyStatus::Healthy;
        }
        if snap.iter().any(|(_, s)| *s == DependencyStatus::Down) {
            DependencyStatus::Down
        } else if snap.iter().any(|(_, s)| *s == DependencyStatus::Degraded) {
            DependencyStatus::Degraded
        } else {
            DependencyStatus::Healthy
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_is_healthy_with_no_sources() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.overall(), DependencyStatus::Healthy);
    }

    #[test]
    fn overall_reflects_worst_source() {
        let registry = HealthRegistry::new();
        for _ in 0..20 {
            registry.record("crypto_primary", true);
        }
        for _ in 0..20 {
            registry.record("crypto_fallback", false);
        }
        assert_eq!(registry.overall(), DependencyStatus::Down);
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
    }
}
