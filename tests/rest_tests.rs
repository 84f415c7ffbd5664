// Integration tests for REST pair discovery and candles against a mock exchange

use mockito::{Matcher, Server};
use std::sync::Arc;
use twap_paper_trader::{
    Exchange, ExchangeRestClient, MarketData, MarketDataCache, OrderRegistry, PairDirectory, PairFormat,
    SchedulerSettings, SubscriberHub, TradingPair, TradingService, TwapError, TwapScheduler, ValidationError,
};

const EXCHANGE_INFO: &str = r#"{"symbols":[
    {"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"},
    {"symbol":"ETHUSDT","status":"TRADING","baseAsset":"ETH","quoteAsset":"USDT"},
    {"symbol":"LUNAUSDT","status":"BREAK","baseAsset":"LUNA","quoteAsset":"USDT"}
]}"#;

const ASSET_PAIRS: &str = r#"{"error":[],"result":{
    "XXBTZUSD":{"altname":"XBTUSD","wsname":"XBT/USD"},
    "XETHZUSD":{"altname":"ETHUSD","wsname":"ETH/USD"}
}}"#;

const BINANCE_KLINES: &str = r#"[
    [1499040000000,"0.0163","0.8000","0.0157","0.0157","148976.11",1499644799999,"2434.19",308,"1756.87","28.46","0"],
    [1499040060000,"0.0157","0.0160","0.0150","0.0159","100.00",1499644859999,"10.00",3,"5.00","1.00","0"]
]"#;

const KRAKEN_OHLC: &str = r#"{"error":[],"result":{"XXBTZUSD":[
    [1688671200,"30306.1","30306.2","30305.7","30305.7","30306.1","3.39243896",23],
    [1688671260,"30305.7","30310.0","30305.7","30309.9","30308.0","1.50000000",11],
    [1688671320,"30309.9","30311.0","30300.0","30301.0","30305.0","2.00000000",9]
],"last":1688671320}}"#;

/// A service whose pair directory starts empty, so the first request loads it over REST
fn cold_service(url: &str) -> (TradingService, Arc<PairDirectory>) {
    let cache = Arc::new(MarketDataCache::new());
    let directory = Arc::new(PairDirectory::new());
    let scheduler = TwapScheduler::new(
        Arc::new(OrderRegistry::new()),
        cache.clone(),
        directory.clone(),
        SchedulerSettings::default(),
    );
    let service = TradingService::new(
        MarketData::new(cache, Arc::new(SubscriberHub::new(8))),
        directory.clone(),
        ExchangeRestClient::new(url, url),
        scheduler,
        Exchange::ALL.to_vec(),
        Vec::new(),
    );
    (service, directory)
}

#[tokio::test]
async fn test_fetch_pairs_from_both_exchanges() {
    let mut server = Server::new_async().await;
    let binance = server
        .mock("GET", "/api/v3/exchangeInfo")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(EXCHANGE_INFO)
        .create_async()
        .await;
    let kraken = server
        .mock("GET", "/0/public/AssetPairs")
        .with_status(200)
        .with_body(ASSET_PAIRS)
        .create_async()
        .await;

    let client = ExchangeRestClient::new(server.url(), format!("{}/", server.url()));

    let listings = client.fetch_pairs(Exchange::Binance).await.unwrap();
    assert_eq!(listings.len(), 2);
    assert!(listings.iter().all(|listing| listing.streaming == listing.query));

    let listings = client.fetch_pairs(Exchange::Kraken).await.unwrap();
    let xbt = listings.iter().find(|listing| listing.query == "XBTUSD").unwrap();
    assert_eq!(xbt.streaming, "XBT/USD");
    assert_eq!(xbt.pair, TradingPair::new("XBT", "USD"));

    binance.assert_async().await;
    kraken.assert_async().await;
}

#[tokio::test]
async fn test_http_error_becomes_upstream() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/exchangeInfo")
        .with_status(500)
        .with_body("maintenance")
        .create_async()
        .await;

    let client = ExchangeRestClient::new(server.url(), server.url());
    match client.fetch_pairs(Exchange::Binance).await {
        Err(TwapError::Upstream(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("maintenance"));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_binance_klines_pass_query_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "1m".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(BINANCE_KLINES)
        .create_async()
        .await;

    let client = ExchangeRestClient::new(server.url(), server.url());
    let klines = client.fetch_klines(Exchange::Binance, "BTCUSDT", "1m", 2).await.unwrap();

    assert_eq!(klines.len(), 2);
    assert_eq!(klines[0].open_time_ms, 1499040000000);
    assert_eq!(klines[1].close, 0.0159);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_service_loads_pairs_then_truncates_kraken_candles() {
    let mut server = Server::new_async().await;
    let pairs = server
        .mock("GET", "/0/public/AssetPairs")
        .with_status(200)
        .with_body(ASSET_PAIRS)
        .expect(1)
        .create_async()
        .await;
    let ohlc = server
        .mock("GET", "/0/public/OHLC")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("pair".into(), "XBTUSD".into()),
            Matcher::UrlEncoded("interval".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body(KRAKEN_OHLC)
        .create_async()
        .await;

    let url = server.url();
    let (service, directory) = cold_service(&url);
    assert!(!directory.is_loaded(Exchange::Kraken));

    // Streaming spelling in, query spelling on the wire
    let klines = service.klines("kraken", "XBT/USD", "1", 2).await.unwrap();
    assert_eq!(klines.len(), 2);
    assert_eq!(klines[0].open_time_ms, 1688671200000);
    assert_eq!(klines[1].volume, 1.5);

    // Directory is warm now; the listing is not fetched again
    let symbols = service.pairs("kraken", PairFormat::Query).await.unwrap();
    assert_eq!(symbols, vec!["ETHUSD".to_string(), "XBTUSD".to_string()]);

    pairs.assert_async().await;
    ohlc.assert_async().await;
}

#[tokio::test]
async fn test_klines_rejects_bad_arguments_without_network() {
    let mut server = Server::new_async().await;
    let untouched = server.mock("GET", Matcher::Any).expect(0).create_async().await;
    let url = server.url();
    let (service, _) = cold_service(&url);

    let err = service.klines("binance", "BTCUSDT", "7m", 10).await.unwrap_err();
    assert!(matches!(err, TwapError::Validation(ValidationError::InvalidInterval(_))));

    let err = service.klines("binance", "BTCUSDT", "1m", 0).await.unwrap_err();
    assert!(matches!(err, TwapError::Validation(ValidationError::InvalidLimit(0))));

    let err = service.klines("binance", "BTCUSDT", "1m", 1001).await.unwrap_err();
    assert!(matches!(err, TwapError::Validation(ValidationError::InvalidLimit(1001))));

    let err = service.klines("coinbase", "BTCUSDT", "1m", 10).await.unwrap_err();
    assert!(matches!(err, TwapError::Validation(ValidationError::UnsupportedExchange(_))));

    untouched.assert_async().await;
}

#[tokio::test]
async fn test_unknown_pair_after_discovery_is_rejected() {
    let mut server = Server::new_async().await;
    let _pairs = server
        .mock("GET", "/api/v3/exchangeInfo")
        .with_status(200)
        .with_body(EXCHANGE_INFO)
        .create_async()
        .await;
    let url = server.url();
    let (service, _) = cold_service(&url);

    let err = service.klines("binance", "DOGEJPY", "1h", 10).await.unwrap_err();
    assert!(matches!(err, TwapError::Validation(ValidationError::UnsupportedPair { .. })));
}
