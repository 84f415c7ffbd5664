// Per-exchange directory of trading pairs in both of their textual representations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Exchange, TradingPair};

/// Which spelling of a pair a caller wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairFormat {
    /// Spelling used on the exchange's live market-data stream
    #[default]
    Streaming,
    /// Spelling used by the exchange's REST endpoints
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairListing {
    pub pair: TradingPair,
    pub streaming: String,
    pub query: String,
    /// The streaming spelling was derived from the query spelling by naming rule
    #[serde(default)]
    pub derived: bool,
}

impl PairListing {
    pub fn symbol(&self, format: PairFormat) -> &str {
        match format {
            PairFormat::Streaming => &self.streaming,
            PairFormat::Query => &self.query,
        }
    }
}

#[derive(Debug, Default)]
struct ExchangePairs {
    listings: Vec<PairListing>,
    by_streaming: HashMap<String, usize>,
    by_query: HashMap<String, usize>,
    by_pair: HashMap<TradingPair, usize>,
}

impl ExchangePairs {
    fn build(listings: Vec<PairListing>) -> Self {
        let mut pairs = ExchangePairs::default();
        for listing in listings {
            if pairs.by_streaming.contains_key(&listing.streaming) {
                continue;
            }
            let idx = pairs.listings.len();
            pairs.by_streaming.insert(listing.streaming.clone(), idx);
            pairs.by_query.entry(listing.query.clone()).or_insert(idx);
            pairs.by_pair.entry(listing.pair.clone()).or_insert(idx);
            pairs.listings.push(listing);
        }
        pairs
    }

    fn resolve(&self, symbol: &str) -> Option<&PairListing> {
        let symbol = symbol.trim();
        let idx = self
            .by_streaming
            .get(symbol)
            .or_else(|| self.by_query.get(symbol))
            .or_else(|| {
                let upper = symbol.to_ascii_uppercase();
                self.by_streaming
                    .get(&upper)
                    .or_else(|| self.by_query.get(&upper))
                    .or_else(|| upper.parse::<TradingPair>().ok().and_then(|p| self.by_pair.get(&p)))
            })?;
        self.listings.get(*idx)
    }
}

/// Bidirectional streaming <-> query mapping, one table per exchange.
#[derive(Debug, Default)]
pub struct PairDirectory {
    exchanges: RwLock<HashMap<Exchange, ExchangePairs>>,
}

impl PairDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table for `exchange`
    pub fn replace(&self, exchange: Exchange, listings: Vec<PairListing>) {
        let table = ExchangePairs::build(listings);
        self.exchanges
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(exchange, table);
    }

    pub fn is_loaded(&self, exchange: Exchange) -> bool {
        self.exchanges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&exchange)
            .map_or(false, |table| !table.listings.is_empty())
    }

    /// Look a pair up by streaming spelling, query spelling or canonical `BASE/QUOTE`
    pub fn resolve(&self, exchange: Exchange, symbol: &str) -> Option<PairListing> {
        let exchanges = self.exchanges.read().unwrap_or_else(|e| e.into_inner());
        exchanges.get(&exchange)?.resolve(symbol).cloned()
    }

    /// Map a symbol seen on the stream back to its canonical pair
    pub fn from_streaming(&self, exchange: Exchange, streaming: &str) -> Option<PairListing> {
        let exchanges = self.exchanges.read().unwrap_or_else(|e| e.into_inner());
        let table = exchanges.get(&exchange)?;
        table
            .by_streaming
            .get(streaming)
            .and_then(|idx| table.listings.get(*idx))
            .cloned()
    }

    pub fn listing(&self, exchange: Exchange, pair: &TradingPair) -> Option<PairListing> {
        let exchanges = self.exchanges.read().unwrap_or_else(|e| e.into_inner());
        let table = exchanges.get(&exchange)?;
        table.by_pair.get(pair).and_then(|idx| table.listings.get(*idx)).cloned()
    }

    pub fn to_query(&self, exchange: Exchange, streaming: &str) -> Option<String> {
        self.from_streaming(exchange, streaming).map(|listing| listing.query)
    }

    pub fn to_streaming(&self, exchange: Exchange, query: &str) -> Option<String> {
        let exchanges = self.exchanges.read().unwrap_or_else(|e| e.into_inner());
        let table = exchanges.get(&exchange)?;
        table
            .by_query
            .get(query)
            .and_then(|idx| table.listings.get(*idx))
            .map(|listing| listing.streaming.clone())
    }

    /// Sorted symbols for `exchange` in the requested spelling
    pub fn symbols(&self, exchange: Exchange, format: PairFormat) -> Vec<String> {
        let exchanges = self.exchanges.read().unwrap_or_else(|e| e.into_inner());
        let mut symbols: Vec<String> = exchanges
            .get(&exchange)
            .map(|table| {
                table
                    .listings
                    .iter()
                    .map(|listing| listing.symbol(format).to_string())
                    .collect()
            })
            .unwrap_or_default();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn len(&self, exchange: Exchange) -> usize {
        self.exchanges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&exchange)
            .map_or(0, |table| table.listings.len())
    }
}

// Quote currencies recognised when splitting a query symbol, longest first so that
// "USDT" wins over "USD".
const KNOWN_QUOTES: &[&str] = &[
    "USDT", "USDC", "DAI", "USD", "EUR", "GBP", "JPY", "CAD", "CHF", "AUD", "AED", "XBT", "BTC",
    "ETH",
];

/// Split a query-format symbol such as `XBTUSD` into a canonical pair.
///
/// Strips a known quote suffix first; if none matches, a symbol of six or more characters is
/// split at its midpoint. Shorter unknown symbols are not guessed at.
pub fn split_query_symbol(query: &str) -> Option<TradingPair> {
    let query = query.trim().to_ascii_uppercase();
    if let Some((base, quote)) = query.split_once('/') {
        return (!base.is_empty() && !quote.is_empty()).then(|| TradingPair::new(base, quote));
    }

    let mut quotes: Vec<&str> = KNOWN_QUOTES.to_vec();
    quotes.sort_by_key(|quote| std::cmp::Reverse(quote.len()));
    for quote in quotes {
        if let Some(base) = query.strip_suffix(quote) {
            if base.len() >= 2 {
                return Some(TradingPair::new(base, quote));
            }
        }
    }

    if query.len() >= 6 && query.is_ascii() {
        let mid = query.len() / 2;
        return Some(TradingPair::new(&query[..mid], &query[mid..]));
    }
    None
}

/// Build a listing whose streaming spelling (`BASE/QUOTE`) is derived from the query spelling
pub fn derive_listing(query: &str) -> Option<PairListing> {
    let pair = split_query_symbol(query)?;
    Some(PairListing {
        streaming: pair.to_string(),
        query: query.to_string(),
        pair,
        derived: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraken_listings() -> Vec<PairListing> {
        vec![
            PairListing {
                pair: TradingPair::new("XBT", "USD"),
                streaming: "XBT/USD".to_string(),
                query: "XBTUSD".to_string(),
                derived: false,
            },
            PairListing {
                pair: TradingPair::new("ETH", "EUR"),
                streaming: "ETH/EUR".to_string(),
                query: "ETHEUR".to_string(),
                derived: false,
            },
        ]
    }

    #[test]
    fn test_bidirectional_mapping() {
        let directory = PairDirectory::new();
        directory.replace(Exchange::Kraken, kraken_listings());

        assert_eq!(directory.to_query(Exchange::Kraken, "XBT/USD").as_deref(), Some("XBTUSD"));
        assert_eq!(directory.to_streaming(Exchange::Kraken, "ETHEUR").as_deref(), Some("ETH/EUR"));
        assert_eq!(directory.to_query(Exchange::Binance, "XBT/USD"), None);
    }

    #[test]
    fn test_resolve_accepts_any_spelling() {
        let directory = PairDirectory::new();
        directory.replace(Exchange::Kraken, kraken_listings());

        for symbol in ["XBT/USD", "XBTUSD", "xbtusd", "xbt/usd"] {
            let listing = directory.resolve(Exchange::Kraken, symbol).unwrap();
            assert_eq!(listing.pair, TradingPair::new("XBT", "USD"), "symbol {}", symbol);
        }
        assert!(directory.resolve(Exchange::Kraken, "DOGEUSD").is_none());
    }

    #[test]
    fn test_symbols_by_format() {
        let directory = PairDirectory::new();
        directory.replace(Exchange::Kraken, kraken_listings());

        assert_eq!(directory.symbols(Exchange::Kraken, PairFormat::Streaming), vec!["ETH/EUR", "XBT/USD"]);
        assert_eq!(directory.symbols(Exchange::Kraken, PairFormat::Query), vec!["ETHEUR", "XBTUSD"]);
        assert!(directory.symbols(Exchange::Binance, PairFormat::Query).is_empty());
        assert!(!directory.is_loaded(Exchange::Binance));
    }

    #[test]
    fn test_split_query_symbol() {
        assert_eq!(split_query_symbol("XBTUSD"), Some(TradingPair::new("XBT", "USD")));
        assert_eq!(split_query_symbol("ETHUSDT"), Some(TradingPair::new("ETH", "USDT")));
        assert_eq!(split_query_symbol("DOTEUR"), Some(TradingPair::new("DOT", "EUR")));
        assert_eq!(split_query_symbol("ABCDEFGH"), Some(TradingPair::new("ABCD", "EFGH")));
        assert_eq!(split_query_symbol("ABC"), None);
    }

    #[test]
    fn test_derived_listing_is_flagged() {
        let listing = derive_listing("SOLGBP").unwrap();
        assert_eq!(listing.streaming, "SOL/GBP");
        assert_eq!(listing.query, "SOLGBP");
        assert!(listing.derived);
    }
}
