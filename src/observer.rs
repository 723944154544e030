// Fan-out hub for live observers (the websocket API surface, future local
// dashboards). Grounded on the `broadcast`-channel usage in the websocket
// relay — a slow subscriber must never block the scan loop, so we drop its
// oldest unread events and count the drops instead of backpressuring the
// sender.

use crate::domain::ActivityEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObserverEvent {
    Activity(ActivityEvent),
    PortfolioUpdated { strategy_name: String, equity_usd: String },
    StrategyStatusChanged { strategy_name: String, enabled: bool, paused: bool },
    Alert { message: String, severity: String },
    /// Emitted by the weekly selector after scoring every strategy. Carries
    /// the full proposal even when `auto_reallocation` is off, so observers
    /// can see what the selector *would* do.
    ReallocationProposed {
        allocations: HashMap<String, Decimal>,
        qualified: Vec<String>,
        applied: bool,
    },
}

struct SubscriberStats {
    dropped: AtomicU64,
}

pub struct ObserverHub {
    sender: broadcast::Sender<ObserverEvent>,
    stats: Arc<SubscriberStats>,
    subscriber_count: AtomicU64,
}

pub struct Subscription {
    receiver: broadcast::Receiver<ObserverEvent>,
    stats: Arc<SubscriberStats>,
}

impl Subscription {
    /// Returns the next event, or `None` if this subscriber lagged and some
    /// events were dropped — the caller can check `dropped_count()` to see
    /// how many, then call again to resume from the next live event.
    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.stats.dropped.fetch_add(n, Ordering::Relaxed);
                None
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

impl ObserverHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        ObserverHub {
            sender,
            stats: Arc::new(SubscriberStats { dropped: AtomicU64::new(0) }),
            subscriber_count: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        Subscription {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Publishing never blocks: `broadcast::Sender::send` only fails when
    /// there are zero subscribers, which we treat as a no-op, not an error.
    pub fn publish(&self, event: ObserverEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> u64 {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = ObserverHub::new(16);
        let mut sub = hub.subscribe();
        hub.publish(ObserverEvent::Alert {
            message: "test".to_string(),
            severity: "info".to_string(),
        });
        let event = sub.recv().await.unwrap();
        matches!(event, ObserverEvent::Alert { .. });
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = ObserverHub::new(16);
        hub.publish(ObserverEvent::Alert {
            message: "test".to_string(),
            severity: "info".to_string(),
        });
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_drops_not_panics() {
        let hub = ObserverHub::new(2);
        let mut sub = hub.subscribe();
        for i in 0..10 {
            hub.publish(ObserverEvent::Alert {
                message: format!("msg-{i}"),
                severity: "info".to_string(),
            });
        }
        // First recv observes the lag and records drops.
        let _ = sub.recv().await;
        assert!(sub.dropped_count() > 0);
    }
}
