// Freshness-tracked market store, keyed by market id. Grounded on
// `market_data::candle_buffer::CandleBuffer`'s `RwLock<HashMap<..>>`
// shape: many readers, a single writer per refresh cycle, readers get
// immutable copies rather than references into the map.

use crate::domain::{Market, MarketId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct MarketCache {
    markets: RwLock<HashMap<MarketId, Market>>,
}

impl MarketCache {
    pub fn new() -> Self {
        MarketCache {
            markets: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or refresh a market. Resets `missed_refreshes` to 0 on sighting.
    pub fn put(&self, mut market: Market) {
        market.missed_refreshes = 0;
        self.markets.write().insert(market.market_id.clone(), market);
    }

    /// Replace the whole active set with the results of one lister refresh,
    /// incrementing `missed_refreshes` for markets absent this round and
    /// evicting markets whose `end_time` passed more than an hour ago or
    /// that have been absent for 3 consecutive refreshes.
    pub fn refresh_active_set(&self, fetched: Vec<Market>, now: DateTime<Utc>) {
        let mut markets = self.markets.write();
        let seen: std::collections::HashSet<MarketId> =
            fetched.iter().map(|m| m.market_id.clone()).collect();

        for market in fetched {
            markets.insert(market.market_id.clone(), market);
        }

        let mut to_evict = Vec::new();
        for (id, market) in markets.iter_mut() {
            if !seen.contains(id) {
                market.missed_refreshes += 1;
            }
            if market.is_expired(now) || market.missed_refreshes >= 3 {
                to_evict.push(id.clone());
            }
        }
        for id in to_evict {
            markets.remove(&id);
        }
    }

    /// Returns a copy of the market if it exists and was updated within
    /// `max_age`. A stale market must never reach the execution gate.
    pub fn fresh(&self, id: &str, max_age: chrono::Duration, now: DateTime<Utc>) -> Option<Market> {
        let markets = self.markets.read();
        let market = markets.get(id)?;
        if now.signed_duration_since(market.last_updated_at) <= max_age {
            Some(market.clone())
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<Market> {
        self.markets.read().get(id).cloned()
    }

    pub fn all_active(&self) -> Vec<Market> {
        self.markets.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.markets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn sample_market(id: &str, end_in_secs: i64) -> Market {
        let now = Utc::now();
        let mut prices = BTreeMap::new();
        prices.insert("YES".to_string(), dec!(0.48));
        prices.insert("NO".to_string(), dec!(0.49));
        Market {
            market_id: id.to_string(),
            question: "will it happen".to_string(),
            outcomes: vec!["YES".to_string(), "NO".to_string()],
            prices,
            liquidity_usd: dec!(10000),
            volume_24h_usd: dec!(5000),
            end_time: now + chrono::Duration::seconds(end_in_secs),
            category: None,
            source: "test".to_string(),
            last_updated_at: now,
            missed_refreshes: 0,
        }
    }

    #[test]
    fn fresh_returns_market_within_max_age() {
        let cache = MarketCache::new();
        cache.put(sample_market("m1", 3600));
        let now = Utc::now();
        assert!(cache.fresh("m1", chrono::Duration::seconds(5), now).is_some());
    }

    #[test]
    fn stale_market_is_not_served() {
        let cache = MarketCache::new();
        let mut m = sample_market("m1", 3600);
        m.last_updated_at = Utc::now() - chrono::Duration::seconds(10);
        cache.put(m);
        let now = Utc::now();
        assert!(cache.fresh("m1", chrono::Duration::seconds(5), now).is_none());
    }

    #[test]
    fn eviction_after_three_missed_refreshes() {
        let cache = MarketCache::new();
        cache.put(sample_market("m1", 3600));
        let now = Utc::now();
        cache.refresh_active_set(vec![], now);
        cache.refresh_active_set(vec![], now);
        assert!(cache.get("m1").is_some());
        cache.refresh_active_set(vec![], now);
        assert!(cache.get("m1").is_none());
    }

    #[test]
    fn eviction_after_expiry_grace_period() {
        let cache = MarketCache::new();
        let m = sample_market("m1", -7200); // ended 2h ago
        cache.put(m);
        let now = Utc::now();
        cache.refresh_active_set(vec![], now);
        assert!(cache.get("m1").is_none());
    }
}
