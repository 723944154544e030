use super::append_line;
use crate::domain::Opportunity;
use std::path::PathBuf;

/// Append-only, never-trimmed opportunity stream — every candidate the
/// detectors emitted, whether or not the gate allowed it.
pub struct OpportunityLog {
    path: PathBuf,
}

impl OpportunityLog {
    pub fn new(path: PathBuf) -> Self {
        OpportunityLog { path }
    }

    pub fn record(&self, opportunity: &Opportunity) {
        if let Ok(line) = serde_json::to_string(opportunity) {
            append_line(&self.path, &line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn appends_one_line_per_opportunity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opportunities.stream");
        let log = OpportunityLog::new(path.clone());
        let opp = Opportunity {
            id: uuid::Uuid::new_v4(),
            strategy_name: "arbitrage".to_string(),
            market_id: "m1".to_string(),
            side: Side::Pair,
            edge_bps: 300,
            size_usd: dec!(10),
            rationale: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(30),
            reference_price: dec!(0.97),
        };
        log.record(&opp);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
