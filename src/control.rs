// Control channel: reads `ControlState` from a durable artifact, falling
// back to an in-process signal. Grounded on `reconcile.rs`'s safety-first
// posture — a malformed or missing control record is treated as paused,
// never as "assume everything is fine".

use crate::domain::ControlState;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::{error, warn};

pub struct ControlChannel {
    path: PathBuf,
    state: RwLock<ControlState>,
}

impl ControlChannel {
    pub fn new(path: PathBuf) -> Self {
        ControlChannel {
            path,
            state: RwLock::new(ControlState::default()),
        }
    }

    /// Reload from disk. Failure (missing file, malformed JSON) fails
    /// closed: the in-memory state is forced to `paused=true` rather than
    /// silently keeping the previous (possibly stale-permissive) state.
    pub fn reload(&self) {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<ControlState>(&contents) {
                Ok(parsed) => {
                    *self.state.write() = parsed;
                }
                Err(e) => {
                    error!(error = %e, path = %self.path.display(), "control record malformed, failing closed to paused");
                    let mut state = self.state.write();
                    state.paused = true;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // No control record yet is normal on first boot; default
                // (not paused, not killed) already holds.
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to read control record, failing closed to paused");
                let mut state = self.state.write();
                state.paused = true;
            }
        }
    }

    pub fn current(&self) -> ControlState {
        self.state.read().clone()
    }

    pub fn pause(&self) {
        let mut state = self.state.write();
        state.paused = true;
        state.updated_at = Utc::now();
        self.persist(&state);
    }

    pub fn resume(&self) {
        let mut state = self.state.write();
        state.paused = false;
        state.updated_at = Utc::now();
        self.persist(&state);
    }

    pub fn kill(&self, reason: impl Into<String>) {
        let mut state = self.state.write();
        state.kill_active = true;
        state.kill_reason = Some(reason.into());
        state.updated_at = Utc::now();
        self.persist(&state);
    }

    fn persist(&self, state: &ControlState) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&tmp_path, json) {
                    error!(error = %e, "failed to write control record temp file");
                    return;
                }
                if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
                    error!(error = %e, "failed to atomically replace control record");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize control record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_keeps_default_not_paused() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ControlChannel::new(dir.path().join("control.record"));
        channel.reload();
        assert!(!channel.current().paused);
    }

    #[test]
    fn malformed_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.record");
        std::fs::write(&path, "{not json").unwrap();
        let channel = ControlChannel::new(path);
        channel.reload();
        assert!(channel.current().paused);
    }

    #[test]
    fn kill_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.record");
        let channel = ControlChannel::new(path.clone());
        channel.kill("operator requested shutdown");
        let reloaded = ControlChannel::new(path);
        reloaded.reload();
        assert!(reloaded.current().kill_active);
        assert_eq!(
            reloaded.current().kill_reason.as_deref(),
            Some("operator requested shutdown")
        );
    }
}
