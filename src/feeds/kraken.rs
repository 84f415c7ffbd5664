// Kraken v1 public WebSocket ticker codec and REST payload parsing

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

use super::pairs::{derive_listing, PairListing};
use super::{is_valid_price, number, FeedMessage, Kline};
use crate::error::{TwapError, TwapResult};
use crate::types::TradingPair;

pub const KLINE_INTERVALS: &[&str] = &["1", "5", "15", "30", "60", "240", "1440", "10080", "21600"];

#[derive(Debug, Deserialize)]
struct EventMessage {
    event: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    pair: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Event(EventMessage),
    Channel(Vec<Value>),
}

/// Ticker subscription for the given WebSocket pair names (`XBT/USD`)
pub fn subscribe_message(symbols: &[String], request_id: u64) -> String {
    json!({
        "event": "subscribe",
        "reqid": request_id,
        "pair": symbols,
        "subscription": {
            "name": "ticker"
        }
    })
    .to_string()
}

pub fn parse_message(text: &str) -> FeedMessage {
    let payload: StreamPayload = match serde_json::from_str(text) {
        Ok(payload) => payload,
        Err(e) => return FeedMessage::Unparsable(e.to_string()),
    };

    match payload {
        StreamPayload::Event(event) => match event.event.as_str() {
            "heartbeat" => FeedMessage::Heartbeat,
            "systemStatus" => FeedMessage::SystemStatus(event.status.unwrap_or_default()),
            "subscriptionStatus" => FeedMessage::SubscriptionStatus {
                symbol: event.pair,
                status: event.status.unwrap_or_default(),
                error: event.error_message,
            },
            other => FeedMessage::Unparsable(format!("unknown event '{}'", other)),
        },
        StreamPayload::Channel(frame) => parse_ticker_frame(&frame),
    }
}

// Ticker frames look like [channelID, {a: [..], b: [..], c: [..], ...}, "ticker", "XBT/USD"]
fn parse_ticker_frame(frame: &[Value]) -> FeedMessage {
    if frame.len() < 4 || frame[2].as_str() != Some("ticker") {
        return FeedMessage::Unparsable("not a ticker frame".to_string());
    }
    let Some(symbol) = frame[3].as_str() else {
        return FeedMessage::Unparsable("ticker frame without pair".to_string());
    };
    let data = &frame[1];

    // A field that is present must hold a usable price
    let first = |key: &str| match data.get(key).and_then(|v| v.get(0)) {
        None => Ok(None),
        Some(v) => match number(v) {
            Ok(price) if is_valid_price(price) => Ok(Some(price)),
            _ => Err(FeedMessage::Unparsable(format!("bad '{}' price for {}: {}", key, symbol, v))),
        },
    };
    let (bid, ask, last) = match (first("b"), first("a"), first("c")) {
        (Ok(bid), Ok(ask), Ok(last)) => (bid, ask, last),
        (Err(bad), _, _) | (_, Err(bad), _) | (_, _, Err(bad)) => return bad,
    };

    let price = match (last, bid, ask) {
        (Some(last), _, _) => last,
        (None, Some(bid), Some(ask)) => (bid + ask) / 2.0,
        _ => return FeedMessage::Unparsable(format!("ticker for {} has no usable price", symbol)),
    };

    FeedMessage::Quote {
        symbol: symbol.to_string(),
        price,
        bid,
        ask,
        observed_at: Utc::now(),
    }
}

#[derive(Debug, Deserialize)]
struct AssetPairsResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, AssetPair>,
}

#[derive(Debug, Deserialize)]
struct AssetPair {
    #[serde(default)]
    altname: Option<String>,
    #[serde(default)]
    wsname: Option<String>,
}

/// Pairs from `GET /0/public/AssetPairs`.
///
/// The stream spelling is `wsname`, the REST spelling `altname`. Entries without `wsname`
/// get one derived from `altname`.
pub fn parse_asset_pairs(body: &str) -> TwapResult<Vec<PairListing>> {
    let response: AssetPairsResponse = serde_json::from_str(body)?;
    if !response.error.is_empty() {
        return Err(TwapError::Upstream(format!("Kraken API error: {}", response.error.join(", "))));
    }

    let mut listings = Vec::with_capacity(response.result.len());
    for (key, info) in response.result {
        let query = info.altname.unwrap_or_else(|| key.clone());
        let listing = match info.wsname {
            Some(wsname) => match wsname.parse::<TradingPair>() {
                Ok(pair) => Some(PairListing { pair, streaming: wsname, query, derived: false }),
                Err(_) => derive_listing(&query),
            },
            None => derive_listing(&query),
        };

        match listing {
            Some(listing) => listings.push(listing),
            None => warn!(pair = %key, "Skipping Kraken pair with unrecognised name"),
        }
    }
    listings.sort_by(|a, b| a.streaming.cmp(&b.streaming));
    Ok(listings)
}

/// Candles from `GET /0/public/OHLC`, truncated to `limit`
pub fn parse_ohlc(body: &str, limit: usize) -> TwapResult<Vec<Kline>> {
    let response: Value = serde_json::from_str(body)?;
    if let Some(errors) = response.get("error").and_then(|e| e.as_array()) {
        if let Some(first) = errors.first() {
            return Err(TwapError::Upstream(format!("Kraken API error: {}", first)));
        }
    }

    // "result" holds one array keyed by the pair plus a "last" cursor
    let rows = response
        .get("result")
        .and_then(|r| r.as_object())
        .and_then(|result| result.values().find_map(|v| v.as_array()))
        .ok_or_else(|| TwapError::Upstream("Invalid OHLC data format".to_string()))?;

    rows.iter()
        .take(limit)
        .map(|row| {
            let row = row
                .as_array()
                .filter(|row| row.len() >= 7)
                .ok_or_else(|| TwapError::Upstream("Invalid candle format".to_string()))?;
            let open_secs = row[0]
                .as_i64()
                .ok_or_else(|| TwapError::Upstream("Invalid timestamp".to_string()))?;
            Ok(Kline {
                open_time_ms: open_secs
                    .checked_mul(1000)
                    .ok_or_else(|| TwapError::Upstream(format!("timestamp {} out of range", open_secs)))?,
                open: number(&row[1])?,
                high: number(&row[2])?,
                low: number(&row[3])?,
                close: number(&row[4])?,
                volume: number(&row[6])?,
            })
        })
        .collect()
}
