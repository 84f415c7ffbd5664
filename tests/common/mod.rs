// Common test utilities and helpers
#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use twap_paper_trader::{
    Config, Exchange, ExchangeRestClient, MarketData, MarketDataCache, OrderRegistry, OrderRequest,
    PairDirectory, PairListing, PriceTick, SchedulerSettings, Side, SubscriberHub, TradingPair,
    TradingService, TwapScheduler,
};

/// Create a test configuration with sensible defaults
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1:0".to_string();
    config.server.auth_token = Some("test-token".to_string());
    config.exchanges.binance.symbols = vec!["BTCUSDT".to_string()];
    config.exchanges.kraken.symbols = vec!["XBT/USD".to_string()];
    config.scheduler.staleness_secs = 10.0;
    config
}

/// Pair listings as the exchanges would report them
pub fn test_listings(exchange: Exchange) -> Vec<PairListing> {
    let listing = |base: &str, quote: &str, streaming: &str, query: &str| PairListing {
        pair: TradingPair::new(base, quote),
        streaming: streaming.to_string(),
        query: query.to_string(),
        derived: false,
    };
    match exchange {
        Exchange::Binance => vec![
            listing("BTC", "USDT", "BTCUSDT", "BTCUSDT"),
            listing("ETH", "USDT", "ETHUSDT", "ETHUSDT"),
        ],
        Exchange::Kraken => vec![
            listing("XBT", "USD", "XBT/USD", "XBTUSD"),
            listing("ETH", "USD", "ETH/USD", "ETHUSD"),
        ],
    }
}

pub fn seeded_directory() -> Arc<PairDirectory> {
    let directory = Arc::new(PairDirectory::new());
    for exchange in Exchange::ALL {
        directory.replace(exchange, test_listings(exchange));
    }
    directory
}

/// Everything a scheduler test needs, sharing one cache and registry
pub struct Harness {
    pub cache: Arc<MarketDataCache>,
    pub hub: Arc<SubscriberHub>,
    pub registry: Arc<OrderRegistry>,
    pub directory: Arc<PairDirectory>,
    pub scheduler: TwapScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SchedulerSettings::default())
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        let cache = Arc::new(MarketDataCache::new());
        let hub = Arc::new(SubscriberHub::new(16));
        let registry = Arc::new(OrderRegistry::new());
        let directory = seeded_directory();
        let scheduler = TwapScheduler::new(registry.clone(), cache.clone(), directory.clone(), settings);
        Self { cache, hub, registry, directory, scheduler }
    }

    pub fn market(&self) -> MarketData {
        MarketData::new(self.cache.clone(), self.hub.clone())
    }

    /// Service over the harness components; REST calls go to `rest_url` for both exchanges
    pub fn service(&self, rest_url: &str) -> TradingService {
        TradingService::new(
            self.market(),
            self.directory.clone(),
            ExchangeRestClient::new(rest_url, rest_url),
            self.scheduler.clone(),
            Exchange::ALL.to_vec(),
            Vec::new(),
        )
    }
}

pub fn order_request(order_id: &str, quantity: f64, window_secs: u64, interval_secs: u64) -> OrderRequest {
    OrderRequest {
        order_id: order_id.to_string(),
        exchange: "kraken".to_string(),
        symbol: "XBT/USD".to_string(),
        side: Side::Buy,
        quantity,
        execution_window: Duration::from_secs(window_secs),
        slice_interval: Duration::from_secs(interval_secs),
        limit_price: None,
    }
}

/// Kraken XBT/USD tick observed `offset_ms` after `base`
pub fn tick_at(base: DateTime<Utc>, offset_ms: i64, price: f64) -> PriceTick {
    PriceTick {
        exchange: Exchange::Kraken,
        pair: TradingPair::new("XBT", "USD"),
        symbol: "XBT/USD".to_string(),
        price,
        bid: None,
        ask: None,
        observed_at: base + ChronoDuration::milliseconds(offset_ms),
    }
}

/// Keep the cache fresh with `price` every second for `secs` seconds of (tokio) time.
/// The first tick is in the cache before this returns.
pub fn spawn_price_feed(cache: Arc<MarketDataCache>, price: f64, secs: u64) -> tokio::task::JoinHandle<()> {
    let base = Utc::now();
    cache.update(tick_at(base, 0, price));
    tokio::spawn(async move {
        for step in 1..=secs {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cache.update(tick_at(base, step as i64 * 1000, price));
        }
    })
}
