use super::append_line;
use crate::domain::ActivityEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;

/// Append-only activity stream, trimmed to the most recent `M` entries in
/// memory (the on-disk stream itself is append-only and never rewritten;
/// trimming only bounds what `recent()` returns to observers).
pub struct ActivityLog {
    path: PathBuf,
    recent: Mutex<VecDeque<ActivityEvent>>,
    max_recent: usize,
}

impl ActivityLog {
    pub fn new(path: PathBuf, max_recent: usize) -> Self {
        ActivityLog {
            path,
            recent: Mutex::new(VecDeque::with_capacity(max_recent)),
            max_recent,
        }
    }

    pub fn record(&self, event: ActivityEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            append_line(&self.path, &line);
        }
        let mut recent = self.recent.lock();
        if recent.len() == self.max_recent {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    pub fn recent(&self) -> Vec<ActivityEvent> {
        self.recent.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn trims_in_memory_recent_to_max() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity.stream"), 3);
        for i in 0..5u64 {
            log.record(ActivityEvent::CycleStarted {
                timestamp: Utc::now(),
                cycle_id: i,
            });
        }
        assert_eq!(log.recent().len(), 3);
    }

    #[test]
    fn appends_a_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.stream");
        let log = ActivityLog::new(path.clone(), 100);
        log.record(ActivityEvent::Heartbeat { timestamp: Utc::now() });
        log.record(ActivityEvent::Heartbeat { timestamp: Utc::now() });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
