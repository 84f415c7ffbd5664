// Exchange feed adapters: stream codecs, pair discovery and reconnecting receive loops

pub mod adapter;
pub mod backoff;
pub mod binance;
pub mod kraken;
pub mod pairs;
pub mod rest;

pub use adapter::{FeedAdapter, FeedHandle};
pub use backoff::BackoffPolicy;
pub use pairs::{PairDirectory, PairFormat, PairListing};
pub use rest::ExchangeRestClient;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{TwapError, TwapResult};
use crate::types::Exchange;

/// One inbound stream message, normalized across exchanges
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Quote {
        /// Symbol in the exchange's streaming representation
        symbol: String,
        price: f64,
        bid: Option<f64>,
        ask: Option<f64>,
        observed_at: DateTime<Utc>,
    },
    SubscriptionStatus {
        symbol: Option<String>,
        status: String,
        error: Option<String>,
    },
    SystemStatus(String),
    Heartbeat,
    /// Anything else; dropped and counted by the adapter
    Unparsable(String),
}

/// One historical candle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// Exchanges send numbers both as JSON strings and as JSON numbers
pub(crate) fn number(value: &Value) -> TwapResult<f64> {
    let parsed = match value.as_str() {
        Some(text) => text
            .parse::<f64>()
            .map_err(|_| TwapError::Upstream(format!("expected numeric field, got '{}'", text)))?,
        None => value
            .as_f64()
            .ok_or_else(|| TwapError::Upstream(format!("expected numeric field, got {}", value)))?,
    };
    if !parsed.is_finite() {
        return Err(TwapError::Upstream(format!("non-finite numeric field {}", value)));
    }
    Ok(parsed)
}

/// Prices must be finite and strictly positive
pub(crate) fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

pub fn parse_message(exchange: Exchange, text: &str) -> FeedMessage {
    match exchange {
        Exchange::Binance => binance::parse_message(text),
        Exchange::Kraken => kraken::parse_message(text),
    }
}

pub fn subscribe_message(exchange: Exchange, symbols: &[String], request_id: u64) -> String {
    match exchange {
        Exchange::Binance => binance::subscribe_message(symbols, request_id),
        Exchange::Kraken => kraken::subscribe_message(symbols, request_id),
    }
}

/// Candle intervals accepted by the exchange's REST API
pub fn kline_intervals(exchange: Exchange) -> &'static [&'static str] {
    match exchange {
        Exchange::Binance => binance::KLINE_INTERVALS,
        Exchange::Kraken => kraken::KLINE_INTERVALS,
    }
}

/// Live counters for one feed adapter
#[derive(Debug, Default)]
pub struct FeedStats {
    messages: AtomicU64,
    ticks: AtomicU64,
    stale: AtomicU64,
    unparsable: AtomicU64,
    reconnects: AtomicU64,
    connected: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    pub exchange: Exchange,
    pub connected: bool,
    pub messages: u64,
    pub ticks: u64,
    pub stale: u64,
    pub unparsable: u64,
    pub reconnects: u64,
}

impl FeedStats {
    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self, accepted: bool) {
        if accepted {
            self.ticks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stale.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_unparsable(&self) {
        self.unparsable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn snapshot(&self, exchange: Exchange) -> FeedStatus {
        FeedStatus {
            exchange,
            connected: self.connected.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            unparsable: self.unparsable.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
