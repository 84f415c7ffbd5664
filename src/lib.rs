// TWAP Paper Trader Library
//
// Live Binance/Kraken market data, simulated TWAP order execution and real-time price fan-out

pub mod api;         // HTTP and WebSocket surface
pub mod config;
pub mod error;       // Unified error handling
pub mod feeds;       // Exchange connections, codecs and pair discovery
pub mod market;      // Latest-price cache and subscriber hub
pub mod orders;      // Order model, registry and TWAP scheduler
pub mod service;
pub mod types;

// Re-export core types
pub use types::{Exchange, PriceTick, Side, TradingPair};

// Re-export error types
pub use error::{TwapError, TwapResult, ValidationError};

// Re-export configuration
pub use config::{Config, ConfigError, ExchangeConfig, FeedConfig, LoggingConfig, SchedulerConfig};

// Re-export feed components
pub use feeds::{
    BackoffPolicy, ExchangeRestClient, FeedAdapter, FeedHandle, FeedMessage, FeedStatus, Kline, PairDirectory,
    PairFormat, PairListing,
};

// Re-export market data components
pub use market::{MarketData, MarketDataCache, PublishReport, SubscriberHub, Subscription};

// Re-export order components
pub use orders::{
    ExecutionSlice, OrderRegistry, OrderRequest, OrderSnapshot, OrderState, OrderSummary, SchedulerSettings,
    SkipReason, SliceOutcome, TwapOrder, TwapScheduler,
};

// Re-export the service facade
pub use service::{Access, HealthReport, TradingService};
