// Append-only durable streams: trades, opportunities, activity. Grounded on
// `runtime_config::RuntimeConfig::save`'s atomic tmp-then-rename write,
// applied per-record rather than to a single config file, plus the
// ring-buffer-eviction idiom from `app_state.rs`'s `push_error`/
// `push_decision` (used here for the activity log's trim-to-last-M rule).

pub mod activity_log;
pub mod opportunity_log;
pub mod trade_log;

pub use activity_log::ActivityLog;
pub use opportunity_log::OpportunityLog;
pub use trade_log::TradeLog;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::error;

/// Append one JSON-serialized record as a single line. A write is either
/// the whole line or nothing: `OpenOptions::append` plus a single `write_all`
/// call gives us record-atomicity on POSIX systems for writes under the
/// pipe buffer size, which every record here is.
pub(crate) fn append_line(path: &Path, line: &str) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{line}"));
    if let Err(e) = result {
        error!(error = %e, path = %path.display(), "failed to append journal record");
    }
}
