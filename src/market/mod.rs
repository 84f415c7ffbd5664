// Market data: latest-price cache and real-time broadcast

pub mod cache;
pub mod hub;

pub use cache::MarketDataCache;
pub use hub::{PublishReport, SubscriberHub, Subscription};

use std::sync::Arc;
use tracing::debug;

use crate::types::PriceTick;

/// Entry point for normalized ticks: the cache decides, the hub broadcasts what it accepted.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub cache: Arc<MarketDataCache>,
    pub hub: Arc<SubscriberHub>,
    log_ticks: bool,
}

impl MarketData {
    pub fn new(cache: Arc<MarketDataCache>, hub: Arc<SubscriberHub>) -> Self {
        Self { cache, hub, log_ticks: false }
    }

    pub fn with_tick_logging(mut self, enabled: bool) -> Self {
        self.log_ticks = enabled;
        self
    }

    /// Apply `tick` to the cache and, if accepted, publish it. Returns whether it was accepted.
    pub fn ingest(&self, tick: PriceTick) -> bool {
        if !self.cache.update(tick.clone()) {
            return false;
        }

        if self.log_ticks {
            debug!(exchange = %tick.exchange, pair = %tick.pair, price = tick.price, "Tick");
        }
        self.hub.publish(&tick);
        true
    }
}
