//! Broadcaster
//!
//! Fans each coalesced trade out to every registered connection.
//!
//! # Cycle
//!
//! 1. List connections once; the list stays fixed for the whole sweep.
//! 2. For every trade, serialize once and push to every connection
//!    concurrently.
//! 3. Collect connections whose push reported `Gone`.
//! 4. After every trade has been attempted, evict the collected set.
//!
//! A failure on one connection never stops delivery to the others, and a
//! failure on one trade never stops the remaining trades.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::application::ports::{
    ConnectionId, ConnectionRegistry, PushOutcome, SubscriberTransport,
};
use crate::domain::coalesce::CoalescedBatch;
use crate::infrastructure::codec::TradeCodec;
use crate::infrastructure::metrics;

/// Connections to remove at the end of a cycle, each at most once.
pub type EvictionSet = BTreeSet<ConnectionId>;

/// What one broadcast cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Connections swept.
    pub connections: usize,
    /// Messages serialized (one per trade).
    pub messages: usize,
    /// Successful pushes.
    pub delivered: usize,
    /// Pushes that failed transiently.
    pub transient_failures: usize,
    /// Connections that reported `Gone`.
    pub evictions: EvictionSet,
    /// Evictions that failed and remain registered.
    pub eviction_failures: usize,
}

/// Pushes coalesced trades to subscribers and evicts dead connections.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<dyn ConnectionRegistry>,
    transport: Arc<dyn SubscriberTransport>,
    codec: TradeCodec,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster").finish_non_exhaustive()
    }
}

impl Broadcaster {
    /// Create a broadcaster over a registry and a transport.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        transport: Arc<dyn SubscriberTransport>,
    ) -> Self {
        Self {
            registry,
            transport,
            codec: TradeCodec::new(),
        }
    }

    /// Run a full cycle: list, deliver, evict.
    ///
    /// A failed scan is logged and the cycle delivers nothing.
    pub async fn broadcast(&self, batch: &CoalescedBatch) -> DeliveryOutcome {
        if batch.is_empty() {
            return DeliveryOutcome::default();
        }

        let connections = match self.registry.list().await {
            Ok(connections) => connections,
            Err(e) => {
                tracing::error!(error = %e, symbols = batch.len(), "Connection scan failed");
                return DeliveryOutcome::default();
            }
        };

        let mut outcome = self.deliver(batch, &connections).await;
        outcome.eviction_failures = self.evict(&outcome.evictions).await;
        outcome
    }

    /// Push every trade in `batch` to every connection in `connections`.
    ///
    /// Does not touch the registry; the caller decides what to do with
    /// `evictions`.
    pub async fn deliver(
        &self,
        batch: &CoalescedBatch,
        connections: &[ConnectionId],
    ) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome {
            connections: connections.len(),
            ..DeliveryOutcome::default()
        };

        if connections.is_empty() {
            return outcome;
        }

        for trade in batch.iter() {
            let payload: Arc<str> = match self.codec.encode_message(trade) {
                Ok(message) => Arc::from(message),
                Err(e) => {
                    tracing::error!(symbol = %trade.symbol, error = %e, "Failed to encode trade message");
                    continue;
                }
            };
            outcome.messages += 1;

            let pushes = connections.iter().map(|id| {
                let payload = Arc::clone(&payload);
                async move { (id, self.transport.push(id, payload).await) }
            });

            for (id, result) in join_all(pushes).await {
                metrics::record_push(&result);
                match result {
                    PushOutcome::Delivered => outcome.delivered += 1,
                    PushOutcome::Gone => {
                        outcome.evictions.insert(id.clone());
                    }
                    PushOutcome::Transient(reason) => {
                        outcome.transient_failures += 1;
                        tracing::warn!(
                            connection_id = %id,
                            symbol = %trade.symbol,
                            reason = %reason,
                            "Push failed, keeping connection"
                        );
                    }
                }
            }
        }

        outcome
    }

    /// Remove every connection in `evictions`; returns how many failed.
    async fn evict(&self, evictions: &EvictionSet) -> usize {
        if evictions.is_empty() {
            return 0;
        }

        tracing::info!(count = evictions.len(), "Cleaning up dead connections");

        let mut failures = 0;
        for id in evictions {
            if let Err(e) = self.registry.evict(id).await {
                failures += 1;
                metrics::record_eviction_error();
                tracing::warn!(connection_id = %id, error = %e, "Eviction failed, retrying next cycle");
            }
        }

        metrics::record_evictions((evictions.len() - failures) as u64);
        failures
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::ports::RegistryError;
    use crate::domain::coalesce::coalesce;
    use crate::domain::trade::TradeEvent;

    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: HashMap<String, PushOutcome>,
        pushes: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn with(outcomes: &[(&str, PushOutcome)]) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(id, o)| ((*id).to_string(), o.clone()))
                    .collect(),
                pushes: Mutex::new(Vec::new()),
            }
        }

        fn pushes_to(&self, id: &str) -> usize {
            self.pushes.lock().iter().filter(|(c, _)| c == id).count()
        }

        fn total_pushes(&self) -> usize {
            self.pushes.lock().len()
        }
    }

    #[async_trait]
    impl SubscriberTransport for ScriptedTransport {
        async fn push(&self, id: &str, payload: Arc<str>) -> PushOutcome {
            self.pushes.lock().push((id.to_string(), payload.to_string()));
            self.outcomes
                .get(id)
                .cloned()
                .unwrap_or(PushOutcome::Delivered)
        }
    }

    struct StaticRegistry {
        connections: Vec<ConnectionId>,
        fail_scan: bool,
        fail_evict: bool,
        evicted: Mutex<Vec<ConnectionId>>,
    }

    impl StaticRegistry {
        fn new(ids: &[&str]) -> Self {
            Self {
                connections: ids.iter().map(|s| (*s).to_string()).collect(),
                fail_scan: false,
                fail_evict: false,
                evicted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConnectionRegistry for StaticRegistry {
        async fn list(&self) -> Result<Vec<ConnectionId>, RegistryError> {
            if self.fail_scan {
                return Err(RegistryError::Scan("unavailable".to_string()));
            }
            Ok(self.connections.clone())
        }

        async fn evict(&self, id: &str) -> Result<(), RegistryError> {
            if self.fail_evict {
                return Err(RegistryError::Evict {
                    id: id.to_string(),
                    reason: "throttled".to_string(),
                });
            }
            self.evicted.lock().push(id.to_string());
            Ok(())
        }
    }

    fn trade(symbol: &str, price: f64) -> TradeEvent {
        TradeEvent {
            symbol: symbol.to_string(),
            timestamp: 1.0,
            price,
            bid: price - 0.01,
            ask: price + 0.01,
            volume: 1000,
            generated_at: String::new(),
        }
    }

    fn batch() -> CoalescedBatch {
        coalesce(vec![trade("AAPL", 150.0), trade("MSFT", 310.0)])
    }

    #[tokio::test]
    async fn empty_connection_set_is_noop() {
        let transport = Arc::new(ScriptedTransport::default());
        let registry = Arc::new(StaticRegistry::new(&[]));
        let broadcaster = Broadcaster::new(registry, transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert_eq!(transport.total_pushes(), 0);
        assert_eq!(outcome.messages, 0);
        assert!(outcome.evictions.is_empty());
    }

    #[tokio::test]
    async fn every_connection_gets_every_trade() {
        let transport = Arc::new(ScriptedTransport::default());
        let registry = Arc::new(StaticRegistry::new(&["a", "b", "c"]));
        let broadcaster = Broadcaster::new(registry, transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert_eq!(outcome.messages, 2);
        assert_eq!(outcome.delivered, 6);
        for id in ["a", "b", "c"] {
            assert_eq!(transport.pushes_to(id), 2);
        }
    }

    #[tokio::test]
    async fn gone_connection_evicted_once() {
        let transport = Arc::new(ScriptedTransport::with(&[("dead", PushOutcome::Gone)]));
        let registry = Arc::new(StaticRegistry::new(&["a", "dead", "b"]));
        let broadcaster = Broadcaster::new(registry.clone(), transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert_eq!(outcome.evictions.len(), 1);
        assert!(outcome.evictions.contains("dead"));
        assert_eq!(*registry.evicted.lock(), vec!["dead".to_string()]);
        assert_eq!(outcome.delivered, 4);
        assert_eq!(transport.pushes_to("a"), 2);
        assert_eq!(transport.pushes_to("b"), 2);
    }

    #[tokio::test]
    async fn transient_failure_keeps_connection() {
        let transport = Arc::new(ScriptedTransport::with(&[(
            "slow",
            PushOutcome::Transient("queue full".to_string()),
        )]));
        let registry = Arc::new(StaticRegistry::new(&["slow", "ok"]));
        let broadcaster = Broadcaster::new(registry.clone(), transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert!(outcome.evictions.is_empty());
        assert!(registry.evicted.lock().is_empty());
        assert_eq!(outcome.transient_failures, 2);
        assert_eq!(outcome.delivered, 2);
    }

    #[tokio::test]
    async fn failed_scan_delivers_nothing() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut registry = StaticRegistry::new(&["a"]);
        registry.fail_scan = true;
        let broadcaster = Broadcaster::new(Arc::new(registry), transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert_eq!(outcome, DeliveryOutcome::default());
        assert_eq!(transport.total_pushes(), 0);
    }

    #[tokio::test]
    async fn failed_eviction_is_counted_not_fatal() {
        let transport = Arc::new(ScriptedTransport::with(&[("dead", PushOutcome::Gone)]));
        let mut registry = StaticRegistry::new(&["dead", "ok"]);
        registry.fail_evict = true;
        let broadcaster = Broadcaster::new(Arc::new(registry), transport.clone());

        let outcome = broadcaster.broadcast(&batch()).await;

        assert_eq!(outcome.evictions.len(), 1);
        assert_eq!(outcome.eviction_failures, 1);
        assert_eq!(transport.pushes_to("ok"), 2);
    }

    #[tokio::test]
    async fn deliver_serializes_once_per_trade() {
        let transport = Arc::new(ScriptedTransport::default());
        let registry = Arc::new(StaticRegistry::new(&[]));
        let broadcaster = Broadcaster::new(registry, transport.clone());

        let connections: Vec<ConnectionId> = vec!["x".into(), "y".into()];
        let outcome = broadcaster.deliver(&batch(), &connections).await;

        assert_eq!(outcome.messages, 2);
        let pushes = transport.pushes.lock();
        let aapl: Vec<_> = pushes.iter().filter(|(_, p)| p.contains("AAPL")).collect();
        assert_eq!(aapl.len(), 2);
        assert_eq!(aapl[0].1, aapl[1].1);
        assert!(aapl[0].1.starts_with(r#"{"type":"trade","data":{"#));
    }
}
