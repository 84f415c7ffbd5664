// Integration tests for the feed adapter against a local WebSocket exchange

mod common;

use common::seeded_directory;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use twap_paper_trader::{
    BackoffPolicy, Exchange, FeedAdapter, MarketData, MarketDataCache, SubscriberHub, TradingPair,
};

fn ticker(symbol: &str, price: f64) -> String {
    format!(
        r#"[42,{{"a":["{ask}",1,"1"],"b":["{bid}",1,"1"],"c":["{price}","0.1"]}},"ticker","{symbol}"]"#,
        ask = price + 1.0,
        bid = price - 1.0,
        price = price,
        symbol = symbol
    )
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(20), Duration::from_millis(100), 2.0, 0.0)
}

/// Pair names from a Kraken subscribe request
fn subscribed_pairs(text: &str) -> Vec<String> {
    let request: Value = serde_json::from_str(text).unwrap();
    assert_eq!(request["event"], "subscribe");
    request["pair"]
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| pair.as_str().unwrap().to_string())
        .collect()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_feed_streams_quotes_and_resubscribes_after_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (requests_tx, mut requests) = mpsc::unbounded_channel::<Vec<String>>();

    let exchange = tokio::spawn(async move {
        // First session: answer the subscription with one quote, then drop the socket
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            requests_tx.send(subscribed_pairs(&text)).unwrap();
        }
        ws.send(Message::Text(ticker("XBT/USD", 30_000.0))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(ws);

        // Second session: the adapter must ask for the same pairs again
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let pairs = subscribed_pairs(&text);
                let reply = pairs.iter().map(|pair| ticker(pair, 31_000.0)).collect::<Vec<_>>();
                requests_tx.send(pairs).unwrap();
                for frame in reply {
                    ws.send(Message::Text(frame)).await.unwrap();
                }
            }
        }
    });

    let market = MarketData::new(Arc::new(MarketDataCache::new()), Arc::new(SubscriberHub::new(8)));
    let (adapter, handle) = FeedAdapter::new(Exchange::Kraken, url, seeded_directory(), market.clone(), fast_backoff());
    let feed = adapter.with_symbols(["XBT/USD"]).spawn();

    assert_eq!(requests.recv().await.unwrap(), vec!["XBT/USD".to_string()]);
    let xbt = TradingPair::new("XBT", "USD");
    wait_for(|| market.cache.latest(Exchange::Kraken, &xbt).is_some()).await;
    let first = market.cache.latest(Exchange::Kraken, &xbt).unwrap();
    assert_eq!(first.price, 30_000.0);
    assert_eq!(first.bid, Some(29_999.0));
    assert_eq!(first.ask, Some(30_001.0));

    // Reconnect replays the subscription set
    assert_eq!(requests.recv().await.unwrap(), vec!["XBT/USD".to_string()]);
    wait_for(|| market.cache.latest(Exchange::Kraken, &xbt).map(|t| t.price) == Some(31_000.0)).await;

    // Subscriptions added at runtime go out on the live connection
    handle.subscribe("ETH/USD").unwrap();
    assert_eq!(requests.recv().await.unwrap(), vec!["ETH/USD".to_string()]);
    let eth = TradingPair::new("ETH", "USD");
    wait_for(|| market.cache.latest(Exchange::Kraken, &eth).is_some()).await;

    let status = handle.status();
    assert!(status.connected);
    assert_eq!(status.reconnects, 1);
    assert_eq!(status.ticks, 3);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), feed).await.unwrap().unwrap();
    assert!(!handle.status().connected);
    exchange.abort();
}

#[tokio::test]
async fn test_feed_keeps_retrying_when_exchange_is_down() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let market = MarketData::new(Arc::new(MarketDataCache::new()), Arc::new(SubscriberHub::new(8)));
    let (adapter, handle) = FeedAdapter::new(Exchange::Binance, url, seeded_directory(), market, fast_backoff());
    let feed = adapter.spawn();

    wait_for(|| handle.status().reconnects >= 2).await;
    assert!(!handle.status().connected);

    // Subscriptions are still accepted while disconnected
    handle.subscribe("BTCUSDT").unwrap();

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), feed).await.unwrap().unwrap();
    assert!(!handle.is_running());
}
