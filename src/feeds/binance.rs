// Binance spot: bookTicker stream codec and REST payload parsing

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::pairs::PairListing;
use super::{is_valid_price, number, FeedMessage, Kline};
use crate::error::{TwapError, TwapResult};
use crate::types::TradingPair;

pub const KLINE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid: String,
    #[serde(rename = "a")]
    ask: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Combined { data: BookTicker },
    Ticker(BookTicker),
    Response { result: Value, id: Value },
    Error { code: i64, msg: String },
}

/// `SUBSCRIBE` request for the book ticker of every symbol given
pub fn subscribe_message(symbols: &[String], request_id: u64) -> String {
    let params: Vec<String> = symbols
        .iter()
        .map(|symbol| format!("{}@bookTicker", symbol.to_ascii_lowercase()))
        .collect();
    json!({
        "method": "SUBSCRIBE",
        "params": params,
        "id": request_id,
    })
    .to_string()
}

pub fn parse_message(text: &str) -> FeedMessage {
    let payload: StreamPayload = match serde_json::from_str(text) {
        Ok(payload) => payload,
        Err(e) => return FeedMessage::Unparsable(e.to_string()),
    };

    match payload {
        StreamPayload::Combined { data, .. } | StreamPayload::Ticker(data) => book_ticker_quote(data),
        StreamPayload::Response { result, id } => FeedMessage::SubscriptionStatus {
            symbol: None,
            status: if result.is_null() { format!("acknowledged #{}", id) } else { result.to_string() },
            error: None,
        },
        StreamPayload::Error { code, msg } => FeedMessage::SubscriptionStatus {
            symbol: None,
            status: "error".to_string(),
            error: Some(format!("{}: {}", code, msg)),
        },
    }
}

fn book_ticker_quote(ticker: BookTicker) -> FeedMessage {
    let (bid, ask) = match (ticker.bid.parse::<f64>(), ticker.ask.parse::<f64>()) {
        (Ok(bid), Ok(ask)) if is_valid_price(bid) && is_valid_price(ask) => (bid, ask),
        _ => return FeedMessage::Unparsable(format!("bad book ticker prices for {}", ticker.symbol)),
    };

    FeedMessage::Quote {
        symbol: ticker.symbol,
        price: (bid + ask) / 2.0,
        bid: Some(bid),
        ask: Some(ask),
        observed_at: Utc::now(),
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
}

/// Pairs from `GET /api/v3/exchangeInfo`; only symbols currently `TRADING` are kept.
/// Binance uses the same spelling on the stream and on REST.
pub fn parse_exchange_info(body: &str) -> TwapResult<Vec<PairListing>> {
    let info: ExchangeInfo = serde_json::from_str(body)?;
    Ok(info
        .symbols
        .into_iter()
        .filter(|symbol| symbol.status == "TRADING")
        .map(|symbol| PairListing {
            pair: TradingPair::new(symbol.base_asset, symbol.quote_asset),
            streaming: symbol.symbol.clone(),
            query: symbol.symbol,
            derived: false,
        })
        .collect())
}

/// Candles from `GET /api/v3/klines`
pub fn parse_klines(body: &str) -> TwapResult<Vec<Kline>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    rows.iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(TwapError::Upstream("short kline row".to_string()));
            }
            Ok(Kline {
                open_time_ms: row[0]
                    .as_i64()
                    .ok_or_else(|| TwapError::Upstream("invalid kline open time".to_string()))?,
                open: number(&row[1])?,
                high: number(&row[2])?,
                low: number(&row[3])?,
                close: number(&row[4])?,
                volume: number(&row[5])?,
            })
        })
        .collect()
}
