//! Request-level operations that tie the feeds, market data and scheduler together.
//!
//! The web layer only translates HTTP into calls on [`TradingService`]; credential checks
//! happen in the transport and arrive here as an [`Access`] value.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{TwapError, TwapResult, ValidationError};
use crate::feeds::pairs::split_query_symbol;
use crate::feeds::{
    kline_intervals, BackoffPolicy, ExchangeRestClient, FeedAdapter, FeedHandle, FeedStatus, Kline,
    PairDirectory, PairFormat,
};
use crate::market::{MarketData, MarketDataCache, SubscriberHub, Subscription};
use crate::orders::{OrderRegistry, OrderRequest, OrderSnapshot, OrderSummary, SchedulerSettings, TwapScheduler};
use crate::types::{Exchange, PriceTick};

pub const MAX_KLINE_LIMIT: usize = 1000;

/// Whether the caller of a protected operation was authenticated by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authorized,
    Anonymous,
}

impl Access {
    pub fn require(self) -> TwapResult<()> {
        match self {
            Access::Authorized => Ok(()),
            Access::Anonymous => Err(TwapError::Unauthorized),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub feeds: Vec<FeedStatus>,
    pub subscribers: usize,
    pub dropped_ticks: u64,
    pub cached_prices: usize,
    pub orders: usize,
    pub active_orders: usize,
}

#[derive(Debug, Clone)]
pub struct TradingService {
    market: MarketData,
    directory: Arc<PairDirectory>,
    rest: ExchangeRestClient,
    scheduler: TwapScheduler,
    exchanges: Vec<Exchange>,
    feeds: Arc<HashMap<Exchange, FeedHandle>>,
}

impl TradingService {
    pub fn new(
        market: MarketData,
        directory: Arc<PairDirectory>,
        rest: ExchangeRestClient,
        scheduler: TwapScheduler,
        exchanges: Vec<Exchange>,
        feeds: Vec<FeedHandle>,
    ) -> Self {
        let feeds = feeds.into_iter().map(|handle| (handle.exchange(), handle)).collect();
        Self {
            market,
            directory,
            rest,
            scheduler,
            exchanges,
            feeds: Arc::new(feeds),
        }
    }

    /// Build every component from `config`, spawn one feed per enabled exchange and run an
    /// initial pair discovery. Discovery failures are logged; the listing is retried on demand.
    pub async fn start(config: &Config) -> TwapResult<(Self, Vec<JoinHandle<()>>)> {
        config.validate()?;

        let cache = Arc::new(MarketDataCache::new());
        let hub = Arc::new(SubscriberHub::new(config.hub.subscriber_buffer));
        let market = MarketData::new(cache.clone(), hub).with_tick_logging(config.logging.log_ticks);
        let directory = Arc::new(PairDirectory::new());
        let registry = Arc::new(OrderRegistry::new());
        let scheduler = TwapScheduler::new(
            registry,
            cache,
            directory.clone(),
            SchedulerSettings::from(&config.scheduler),
        );
        let rest = ExchangeRestClient::from_config(&config.exchanges);
        let backoff = BackoffPolicy::from_config(&config.feed);

        let exchanges = config.exchanges.enabled();
        let mut handles = Vec::new();
        let mut tasks = Vec::new();
        for exchange in &exchanges {
            let settings = config.exchanges.get(*exchange);
            let (adapter, handle) = FeedAdapter::new(
                *exchange,
                settings.ws_url.clone(),
                directory.clone(),
                market.clone(),
                backoff.clone(),
            );
            tasks.push(adapter.with_symbols(settings.symbols.clone()).spawn());
            handles.push(handle);
        }

        let service = Self::new(market, directory, rest, scheduler, exchanges.clone(), handles);
        for exchange in exchanges {
            if let Err(e) = service.refresh_pairs(exchange).await {
                warn!(exchange = %exchange, error = %e, "Initial pair discovery failed");
            }
        }
        Ok((service, tasks))
    }

    /// Enabled exchanges
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.clone()
    }

    fn exchange(&self, name: &str) -> TwapResult<Exchange> {
        let exchange: Exchange = name.parse()?;
        if !self.exchanges.contains(&exchange) {
            return Err(ValidationError::UnsupportedExchange(name.to_string()).into());
        }
        Ok(exchange)
    }

    /// Reload the pair directory for `exchange` from its REST listing
    pub async fn refresh_pairs(&self, exchange: Exchange) -> TwapResult<usize> {
        let listings = self.rest.fetch_pairs(exchange).await?;
        let derived = listings.iter().filter(|listing| listing.derived).count();
        let count = listings.len();
        self.directory.replace(exchange, listings);
        info!(exchange = %exchange, pairs = count, derived, "Pair directory loaded");
        Ok(count)
    }

    async fn ensure_pairs(&self, exchange: Exchange) -> TwapResult<()> {
        if self.directory.is_loaded(exchange) {
            return Ok(());
        }
        self.refresh_pairs(exchange).await.map(|_| ())
    }

    /// Pairs of `exchange` in the requested representation. Served from the directory,
    /// falling back to the exchange listing endpoint when nothing is cached yet.
    pub async fn pairs(&self, exchange: &str, format: PairFormat) -> TwapResult<Vec<String>> {
        let exchange = self.exchange(exchange)?;
        self.ensure_pairs(exchange).await?;
        Ok(self.directory.symbols(exchange, format))
    }

    pub async fn submit_order(&self, access: Access, request: OrderRequest) -> TwapResult<OrderSnapshot> {
        access.require()?;
        let exchange = self.exchange(&request.exchange)?;
        self.ensure_pairs(exchange).await?;

        let snapshot = self.scheduler.submit(request)?;
        self.stream_pair(exchange, &snapshot.order.symbol);
        Ok(snapshot)
    }

    pub fn order(&self, access: Access, order_id: &str) -> TwapResult<OrderSnapshot> {
        access.require()?;
        self.scheduler.registry().get(order_id)
    }

    /// Summaries in submission order, optionally restricted to one order id
    pub fn orders(&self, access: Access, order_id: Option<&str>) -> TwapResult<Vec<OrderSummary>> {
        access.require()?;
        let summaries = self.scheduler.registry().list_all();
        Ok(match order_id {
            Some(id) => summaries.into_iter().filter(|summary| summary.order_id == id).collect(),
            None => summaries,
        })
    }

    pub fn cancel_order(&self, access: Access, order_id: &str) -> TwapResult<OrderSnapshot> {
        access.require()?;
        self.scheduler.cancel(order_id)
    }

    /// Latest cached tick for a pair given in any representation
    pub fn latest_price(&self, exchange: &str, symbol: &str) -> TwapResult<PriceTick> {
        let exchange = self.exchange(exchange)?;
        let pair = self
            .directory
            .resolve(exchange, symbol)
            .map(|listing| listing.pair)
            .or_else(|| split_query_symbol(symbol))
            .ok_or_else(|| ValidationError::UnsupportedPair {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
            })?;
        self.market
            .cache
            .latest(exchange, &pair)
            .ok_or_else(|| TwapError::NotFound(format!("price for {} on {}", pair, exchange)))
    }

    pub fn price_snapshot(&self, exchange: Option<&str>) -> TwapResult<Vec<PriceTick>> {
        let exchange = exchange.map(|name| self.exchange(name)).transpose()?;
        Ok(self.market.cache.snapshot(exchange))
    }

    /// Attach a listener for every accepted tick
    pub fn subscribe(&self) -> Subscription {
        self.market.hub.subscribe()
    }

    pub async fn klines(&self, exchange: &str, symbol: &str, interval: &str, limit: usize) -> TwapResult<Vec<Kline>> {
        let exchange = self.exchange(exchange)?;
        if !kline_intervals(exchange).iter().any(|known| *known == interval) {
            return Err(ValidationError::InvalidInterval(interval.to_string()).into());
        }
        if limit == 0 || limit > MAX_KLINE_LIMIT {
            return Err(ValidationError::InvalidLimit(limit).into());
        }

        self.ensure_pairs(exchange).await?;
        let listing = self.directory.resolve(exchange, symbol).ok_or_else(|| {
            ValidationError::UnsupportedPair {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
            }
        })?;

        self.stream_pair(exchange, &listing.streaming);
        self.rest.fetch_klines(exchange, &listing.query, interval, limit).await
    }

    // Start live prices for a pair; an order stays valid even if the feed is down
    fn stream_pair(&self, exchange: Exchange, streaming_symbol: &str) {
        if let Some(feed) = self.feeds.get(&exchange) {
            if let Err(e) = feed.subscribe(streaming_symbol) {
                warn!(exchange = %exchange, symbol = %streaming_symbol, error = %e, "Could not subscribe feed");
            }
        }
    }

    pub fn feed_status(&self) -> Vec<FeedStatus> {
        let mut statuses: Vec<FeedStatus> = self.feeds.values().map(FeedHandle::status).collect();
        statuses.sort_by_key(|status| status.exchange);
        statuses
    }

    pub fn health(&self) -> HealthReport {
        let feeds = self.feed_status();
        let degraded = feeds.iter().any(|feed| !feed.connected);
        HealthReport {
            status: if degraded { "degraded" } else { "ok" },
            feeds,
            subscribers: self.market.hub.subscriber_count(),
            dropped_ticks: self.market.hub.dropped_total(),
            cached_prices: self.market.cache.len(),
            orders: self.scheduler.registry().len(),
            active_orders: self.scheduler.active_orders(),
        }
    }

    /// Ask every feed to close its connection
    pub fn shutdown(&self) {
        for feed in self.feeds.values() {
            feed.shutdown();
        }
    }
}
