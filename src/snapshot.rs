// Atomic snapshot writer: serializes engine state to a single durable
// artifact every cycle, write-to-temp-then-rename so readers never observe
// torn state. Grounded directly on `runtime_config::RuntimeConfig::save`'s
// atomic persistence pattern, applied to a richer `EngineSnapshot` covering
// portfolio state, control state, and source health rather than just
// config.

use crate::domain::{ControlState, PortfolioSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, warn};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealthSnapshot {
    pub source: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub driver_status: String,
    pub aggregate: PortfolioSnapshot,
    pub per_strategy: Vec<PortfolioSnapshot>,
    pub control: ControlState,
    pub last_cycle_started_at: chrono::DateTime<chrono::Utc>,
    pub last_cycle_duration_ms: i64,
    pub market_count: usize,
    pub source_health: Vec<SourceHealthSnapshot>,
    /// Unknown fields from a newer schema version are preserved verbatim
    /// rather than dropped, so a downgrade-then-reload round-trips cleanly.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: PathBuf) -> Self {
        SnapshotWriter { path }
    }

    /// Write bounded to a ~1s budget: if serialization and the write take
    /// longer, log and continue rather than stall the cycle.
    pub fn write(&self, snapshot: &EngineSnapshot) {
        let start = Instant::now();
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let json = match serde_json::to_string_pretty(snapshot) {
            Ok(j) => j,
            Err(e) => {
                error!(error = %e, "failed to serialize snapshot");
                return;
            }
        };
        let tmp_path = self.path.with_extension("tmp");
        if let Err(e) = std::fs::write(&tmp_path, json) {
            error!(error = %e, "failed to write snapshot temp file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            error!(error = %e, "failed to atomically replace snapshot");
        }
        if start.elapsed() > std::time::Duration::from_secs(1) {
            warn!(elapsed_ms = start.elapsed().as_millis() as u64, "snapshot write exceeded 1s budget");
        }
    }

    pub fn read(&self) -> Option<EngineSnapshot> {
        Self::read_from(&self.path)
    }

    pub fn read_from(path: &Path) -> Option<EngineSnapshot> {
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RollingMetrics;
    use rust_decimal_macros::dec;

    fn sample_snapshot() -> EngineSnapshot {
        EngineSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            driver_status: "running".to_string(),
            aggregate: PortfolioSnapshot {
                strategy_name: "aggregate".to_string(),
                cash_usd: dec!(10000),
                positions: vec![],
                equity_usd: dec!(10000),
                daily_pnl_usd: dec!(0),
                metrics: RollingMetrics::default(),
            },
            per_strategy: vec![],
            control: ControlState::default(),
            last_cycle_started_at: chrono::Utc::now(),
            last_cycle_duration_ms: 120,
            market_count: 5,
            source_health: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn round_trip_preserves_value() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("bot_state.snapshot"));
        let snapshot = sample_snapshot();
        writer.write(&snapshot);
        let read_back = writer.read().unwrap();
        assert_eq!(read_back.market_count, snapshot.market_count);
        assert_eq!(read_back.aggregate.cash_usd, snapshot.aggregate.cash_usd);
    }

    #[test]
    fn unknown_fields_are_preserved_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_state.snapshot");
        let mut snapshot = sample_snapshot();
        snapshot
            .extra
            .insert("future_field".to_string(), serde_json::json!("some-value"));
        let writer = SnapshotWriter::new(path);
        writer.write(&snapshot);
        let read_back = writer.read().unwrap();
        assert_eq!(
            read_back.extra.get("future_field"),
            Some(&serde_json::json!("some-value"))
        );
    }

    #[test]
    fn no_writer_ever_leaves_a_torn_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_state.snapshot");
        let writer = SnapshotWriter::new(path.clone());
        writer.write(&sample_snapshot());
        // No .tmp file should remain after a successful write.
        assert!(!path.with_extension("tmp").exists());
    }
}
