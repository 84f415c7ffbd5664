// Reconnecting WebSocket receive loop for one exchange

use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::pairs::{split_query_symbol, PairDirectory};
use super::{parse_message, subscribe_message, FeedMessage, FeedStats, FeedStatus};
use crate::error::{TwapError, TwapResult};
use crate::market::MarketData;
use crate::types::{Exchange, PriceTick};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    /// Subscribe to a pair, given in the exchange's streaming representation
    Subscribe(String),
    Shutdown,
}

enum SessionEnd {
    Disconnected,
    Shutdown,
}

/// Cloneable control handle for a running [`FeedAdapter`]
#[derive(Debug, Clone)]
pub struct FeedHandle {
    exchange: Exchange,
    commands: mpsc::UnboundedSender<FeedCommand>,
    stats: Arc<FeedStats>,
}

impl FeedHandle {
    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Ask the adapter to stream `symbol`. Subscriptions survive reconnects.
    pub fn subscribe(&self, symbol: impl Into<String>) -> TwapResult<()> {
        self.commands
            .send(FeedCommand::Subscribe(symbol.into()))
            .map_err(|_| TwapError::FeedUnavailable(format!("{} feed has stopped", self.exchange)))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(FeedCommand::Shutdown);
    }

    pub fn status(&self) -> FeedStatus {
        self.stats.snapshot(self.exchange)
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Owns one exchange connection: connects, (re)subscribes, normalizes every message into the
/// market data path and reconnects with backoff when the connection drops.
pub struct FeedAdapter {
    exchange: Exchange,
    url: String,
    directory: Arc<PairDirectory>,
    market: MarketData,
    stats: Arc<FeedStats>,
    backoff: BackoffPolicy,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    subscriptions: BTreeSet<String>,
    request_id: u64,
    session_messages: u64,
}

impl FeedAdapter {
    pub fn new(
        exchange: Exchange,
        url: impl Into<String>,
        directory: Arc<PairDirectory>,
        market: MarketData,
        backoff: BackoffPolicy,
    ) -> (Self, FeedHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let stats = Arc::new(FeedStats::default());
        let handle = FeedHandle { exchange, commands: sender, stats: stats.clone() };
        let adapter = Self {
            exchange,
            url: url.into(),
            directory,
            market,
            stats,
            backoff,
            commands,
            subscriptions: BTreeSet::new(),
            request_id: 0,
            session_messages: 0,
        };
        (adapter, handle)
    }

    /// Pairs to subscribe to on every connect
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let mut attempt: u32 = 0;
        info!(exchange = %self.exchange, url = %self.url, "Starting feed");

        loop {
            match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => {
                    warn!(exchange = %self.exchange, "Feed connection closed");
                }
                Err(e) => {
                    warn!(exchange = %self.exchange, error = %e, category = e.category(), "Feed connection failed");
                }
            }
            self.stats.set_connected(false);

            // A session that delivered data counts as a recovery
            if self.session_messages > 0 {
                attempt = 0;
            }
            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(exchange = %self.exchange, delay_ms = delay.as_millis() as u64, attempt, "Reconnecting feed");

            if !self.wait(delay).await {
                break;
            }
            self.stats.record_reconnect();
        }

        self.stats.set_connected(false);
        info!(exchange = %self.exchange, "Feed stopped");
    }

    // Sleep through the backoff while still accepting subscriptions. False means shut down.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Subscribe(symbol)) => {
                        self.subscriptions.insert(symbol);
                    }
                    Some(FeedCommand::Shutdown) | None => return false,
                },
            }
        }
    }

    async fn session(&mut self) -> TwapResult<SessionEnd> {
        self.session_messages = 0;
        let (ws_stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TwapError::FeedUnavailable(format!("connect to {} timed out", self.url)))??;
        info!(exchange = %self.exchange, "Connected to feed");
        self.stats.set_connected(true);

        let (mut sender, mut receiver) = ws_stream.split();

        if !self.subscriptions.is_empty() {
            let symbols: Vec<String> = self.subscriptions.iter().cloned().collect();
            sender.send(Message::Text(self.next_subscribe(&symbols))).await?;
            info!(exchange = %self.exchange, count = symbols.len(), "Subscribed to pairs");
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Subscribe(symbol)) => {
                        if self.subscriptions.insert(symbol.clone()) {
                            info!(exchange = %self.exchange, symbol = %symbol, "Subscribing to pair");
                            sender.send(Message::Text(self.next_subscribe(&[symbol]))).await?;
                        }
                    }
                    Some(FeedCommand::Shutdown) | None => {
                        let _ = sender.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                },
                message = receiver.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(payload))) => sender.send(Message::Pong(payload)).await?,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(exchange = %self.exchange, ?frame, "Close frame received");
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        self.stats.record_unparsable();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Disconnected),
                },
            }
        }
    }

    fn next_subscribe(&mut self, symbols: &[String]) -> String {
        self.request_id += 1;
        subscribe_message(self.exchange, symbols, self.request_id)
    }

    fn handle_text(&mut self, text: &str) {
        self.session_messages += 1;
        self.stats.record_message();

        match parse_message(self.exchange, text) {
            FeedMessage::Quote { symbol, price, bid, ask, observed_at } => {
                let pair = match self.directory.from_streaming(self.exchange, &symbol) {
                    Some(listing) => listing.pair,
                    None => match split_query_symbol(&symbol) {
                        Some(pair) => pair,
                        None => {
                            self.stats.record_unparsable();
                            debug!(exchange = %self.exchange, symbol = %symbol, "Quote for unknown pair dropped");
                            return;
                        }
                    },
                };

                let tick = PriceTick {
                    exchange: self.exchange,
                    pair,
                    symbol,
                    price,
                    bid,
                    ask,
                    observed_at,
                };
                let accepted = self.market.ingest(tick);
                self.stats.record_tick(accepted);
            }
            FeedMessage::SubscriptionStatus { symbol, status, error: Some(error) } => {
                warn!(exchange = %self.exchange, symbol = ?symbol, status = %status, error = %error, "Subscription rejected");
            }
            FeedMessage::SubscriptionStatus { symbol, status, error: None } => {
                debug!(exchange = %self.exchange, symbol = ?symbol, status = %status, "Subscription status");
            }
            FeedMessage::SystemStatus(status) => {
                info!(exchange = %self.exchange, status = %status, "Exchange system status");
            }
            FeedMessage::Heartbeat => {}
            FeedMessage::Unparsable(reason) => {
                self.stats.record_unparsable();
                debug!(exchange = %self.exchange, reason = %reason, "Dropped unparsable message");
            }
        }
    }
}
