// Latest-price store keyed by (exchange, pair)

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{Exchange, PriceTick, TradingPair};

#[derive(Debug, Clone)]
struct CachedTick {
    tick: PriceTick,
    received_at: Instant,
}

/// Concurrency-safe last-value store. Holds only the newest tick per (exchange, pair).
///
/// Freshness is measured against the local receive time rather than `observed_at`, so a
/// skewed exchange clock cannot make a dead feed look alive.
#[derive(Debug, Default)]
pub struct MarketDataCache {
    entries: RwLock<HashMap<(Exchange, TradingPair), CachedTick>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tick` unless a tick observed at the same time or later is already held.
    ///
    /// Returns whether the tick was accepted.
    pub fn update(&self, tick: PriceTick) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let key = (tick.exchange, tick.pair.clone());

        if let Some(current) = entries.get(&key) {
            if tick.observed_at <= current.tick.observed_at {
                return false;
            }
        }

        entries.insert(key, CachedTick { tick, received_at: Instant::now() });
        true
    }

    pub fn latest(&self, exchange: Exchange, pair: &TradingPair) -> Option<PriceTick> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&(exchange, pair.clone())).map(|cached| cached.tick.clone())
    }

    /// Latest tick together with how long ago it was received
    pub fn latest_with_age(&self, exchange: Exchange, pair: &TradingPair) -> Option<(PriceTick, Duration)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&(exchange, pair.clone()))
            .map(|cached| (cached.tick.clone(), cached.received_at.elapsed()))
    }

    /// All held ticks, optionally restricted to one exchange, ordered by exchange then pair
    pub fn snapshot(&self, exchange: Option<Exchange>) -> Vec<PriceTick> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut ticks: Vec<PriceTick> = entries
            .values()
            .filter(|cached| exchange.map_or(true, |wanted| cached.tick.exchange == wanted))
            .map(|cached| cached.tick.clone())
            .collect();
        ticks.sort_by(|a, b| (a.exchange, &a.pair).cmp(&(b.exchange, &b.pair)));
        ticks
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
