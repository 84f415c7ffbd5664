// Public REST endpoints: pair discovery and historical candles

use std::time::Duration;
use tracing::debug;

use super::pairs::PairListing;
use super::{binance, kraken, Kline};
use crate::config::ExchangesConfig;
use crate::error::{TwapError, TwapResult};
use crate::types::Exchange;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ExchangeRestClient {
    client: reqwest::Client,
    binance_url: String,
    kraken_url: String,
}

impl ExchangeRestClient {
    pub fn new(binance_url: impl Into<String>, kraken_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            binance_url: binance_url.into().trim_end_matches('/').to_string(),
            kraken_url: kraken_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ExchangesConfig) -> Self {
        Self::new(config.binance.rest_url.clone(), config.kraken.rest_url.clone())
    }

    fn base_url(&self, exchange: Exchange) -> &str {
        match exchange {
            Exchange::Binance => &self.binance_url,
            Exchange::Kraken => &self.kraken_url,
        }
    }

    async fn get(&self, exchange: Exchange, path: &str, params: &[(&str, String)]) -> TwapResult<String> {
        let url = format!("{}{}", self.base_url(exchange), path);
        debug!(exchange = %exchange, url = %url, "REST request");

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TwapError::Upstream(format!(
                "{} returned HTTP {}: {}",
                exchange,
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(body)
    }

    /// Every tradable pair the exchange lists, in both representations
    pub async fn fetch_pairs(&self, exchange: Exchange) -> TwapResult<Vec<PairListing>> {
        match exchange {
            Exchange::Binance => {
                let body = self.get(exchange, "/api/v3/exchangeInfo", &[]).await?;
                binance::parse_exchange_info(&body)
            }
            Exchange::Kraken => {
                let body = self.get(exchange, "/0/public/AssetPairs", &[]).await?;
                kraken::parse_asset_pairs(&body)
            }
        }
    }

    /// Historical candles for a pair in query representation. `interval` must be one of the
    /// exchange's native interval names.
    pub async fn fetch_klines(
        &self,
        exchange: Exchange,
        query_symbol: &str,
        interval: &str,
        limit: usize,
    ) -> TwapResult<Vec<Kline>> {
        match exchange {
            Exchange::Binance => {
                let params = [
                    ("symbol", query_symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ];
                let body = self.get(exchange, "/api/v3/klines", &params).await?;
                binance::parse_klines(&body)
            }
            Exchange::Kraken => {
                let params = [
                    ("pair", query_symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("since", "0".to_string()),
                ];
                let body = self.get(exchange, "/0/public/OHLC", &params).await?;
                kraken::parse_ohlc(&body, limit)
            }
        }
    }
}
