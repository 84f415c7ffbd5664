// Timed slice execution for accepted TWAP orders

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::model::{build_slices, offset_time, slice_count, OrderRecord, OrderRequest, OrderSnapshot, OrderState, SkipReason, TwapOrder};
use super::registry::{OrderRegistry, SliceUpdate};
use crate::config::SchedulerConfig;
use crate::error::{TwapResult, ValidationError};
use crate::feeds::PairDirectory;
use crate::market::MarketDataCache;
use crate::types::{Exchange, Side, TradingPair};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Oldest tick still considered fresh when a slice fires
    pub staleness: Duration,
    pub quantity_step: f64,
    /// Upper bound on the slices one order may be split into
    pub max_slices: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { staleness: Duration::from_secs(10), quantity_step: 1.0, max_slices: 10_000 }
    }
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            staleness: config.staleness(),
            quantity_step: config.quantity_step,
            max_slices: config.max_slices,
        }
    }
}

/// Validates submissions and runs one independent slicing task per accepted order.
///
/// A task holds only the order id; every slice outcome goes through the registry.
#[derive(Debug, Clone)]
pub struct TwapScheduler {
    registry: Arc<OrderRegistry>,
    cache: Arc<MarketDataCache>,
    directory: Arc<PairDirectory>,
    settings: SchedulerSettings,
    cancels: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
}

struct SliceJob {
    exchange: Exchange,
    pair: TradingPair,
    side: Side,
    limit_price: Option<f64>,
    offsets: Vec<Duration>,
}

impl TwapScheduler {
    pub fn new(
        registry: Arc<OrderRegistry>,
        cache: Arc<MarketDataCache>,
        directory: Arc<PairDirectory>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            directory,
            settings,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    /// Validate `request`, record the order with its full schedule and start executing it.
    ///
    /// Nothing is recorded when validation fails. Must be called inside a tokio runtime.
    pub fn submit(&self, request: OrderRequest) -> TwapResult<OrderSnapshot> {
        let order = self.validate(request)?;
        let slices = build_slices(&order, self.settings.quantity_step);
        let order_id = order.order_id.clone();

        let record = OrderRecord::new(order, slices);
        let snapshot = record.snapshot();
        self.registry.insert(record)?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(order_id.clone(), cancel_tx);

        info!(
            order_id = %order_id,
            exchange = %snapshot.order.exchange,
            pair = %snapshot.order.pair,
            side = %snapshot.order.side,
            quantity = snapshot.order.total_quantity,
            slices = snapshot.slices.len(),
            "TWAP order accepted"
        );

        let scheduler = self.clone();
        let start = Instant::now();
        tokio::spawn(async move { scheduler.run_order(order_id, start, cancel_rx).await });

        Ok(snapshot)
    }

    fn validate(&self, request: OrderRequest) -> TwapResult<TwapOrder> {
        let order_id = request.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(ValidationError::EmptyOrderId.into());
        }
        if self.registry.contains(&order_id) {
            return Err(ValidationError::DuplicateOrderId(order_id).into());
        }

        let exchange: Exchange = request.exchange.parse()?;

        if !(request.quantity > 0.0 && request.quantity.is_finite()) {
            return Err(ValidationError::NonPositiveQuantity(request.quantity).into());
        }
        if request.execution_window.is_zero() {
            return Err(ValidationError::NonPositiveWindow.into());
        }
        if request.slice_interval.is_zero() {
            return Err(ValidationError::NonPositiveInterval.into());
        }
        if request.slice_interval > request.execution_window {
            return Err(ValidationError::IntervalExceedsWindow {
                interval_secs: request.slice_interval.as_secs_f64(),
                window_secs: request.execution_window.as_secs_f64(),
            }
            .into());
        }

        let slices = slice_count(request.execution_window, request.slice_interval);
        if slices > self.settings.max_slices {
            return Err(ValidationError::TooManySlices { slices, max: self.settings.max_slices }.into());
        }
        // Every scheduled_at lies at or before created_at + window
        let created_at = Utc::now();
        if offset_time(created_at, request.execution_window).is_none() {
            return Err(ValidationError::WindowOutOfRange {
                window_secs: request.execution_window.as_secs_f64(),
            }
            .into());
        }

        if let Some(limit) = request.limit_price {
            if !(limit > 0.0 && limit.is_finite()) {
                return Err(ValidationError::InvalidLimitPrice(limit).into());
            }
        }

        let listing = self.directory.resolve(exchange, &request.symbol).ok_or_else(|| {
            ValidationError::UnsupportedPair {
                exchange: exchange.to_string(),
                symbol: request.symbol.clone(),
            }
        })?;

        Ok(TwapOrder {
            order_id,
            exchange,
            pair: listing.pair,
            symbol: listing.streaming,
            side: request.side,
            total_quantity: request.quantity,
            execution_window: request.execution_window,
            slice_interval: request.slice_interval,
            limit_price: request.limit_price,
            created_at,
        })
    }

    /// Stop the remaining slices of a `pending` or `in_progress` order
    pub fn cancel(&self, order_id: &str) -> TwapResult<OrderSnapshot> {
        let snapshot = self.registry.mark_cancelled(order_id)?;
        if let Some(signal) = self.cancels.lock().unwrap_or_else(|e| e.into_inner()).get(order_id) {
            let _ = signal.send(true);
        }
        info!(order_id = %order_id, "TWAP order cancelled");
        Ok(snapshot)
    }

    /// Orders whose slicing task is still running
    pub fn active_orders(&self) -> usize {
        self.cancels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn run_order(self, order_id: String, start: Instant, mut cancel: watch::Receiver<bool>) {
        match self.job(&order_id) {
            Ok(job) => self.execute(&order_id, job, start, &mut cancel).await,
            Err(e) => error!(order_id = %order_id, error = %e, "Cannot start TWAP order"),
        }
        self.cancels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&order_id);
    }

    fn job(&self, order_id: &str) -> TwapResult<SliceJob> {
        let snapshot = self.registry.get(order_id)?;
        Ok(SliceJob {
            exchange: snapshot.order.exchange,
            pair: snapshot.order.pair,
            side: snapshot.order.side,
            limit_price: snapshot.order.limit_price,
            offsets: snapshot.slices.iter().map(|slice| slice.offset).collect(),
        })
    }

    async fn execute(&self, order_id: &str, job: SliceJob, start: Instant, cancel: &mut watch::Receiver<bool>) {
        for (index, offset) in job.offsets.iter().enumerate() {
            // Deadlines are fixed from acceptance; a late slice does not push back the next one
            tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    debug!(order_id = %order_id, slice = index, "Slicing stopped by cancellation");
                    return;
                }
                _ = tokio::time::sleep_until(start + *offset) => {}
            }

            let update = self.evaluate(&job);
            match &update {
                SliceUpdate::Filled { price, .. } => {
                    info!(order_id = %order_id, slice = index, price = *price, "Slice filled");
                }
                SliceUpdate::Skipped { reason } => {
                    warn!(order_id = %order_id, slice = index, reason = ?reason, "Slice skipped");
                }
            }

            match self.registry.mutate_slice(order_id, index, update) {
                Ok(OrderState::Cancelled) => return,
                Ok(state) if state.is_terminal() => {
                    info!(order_id = %order_id, state = ?state, "TWAP order finished");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(order_id = %order_id, slice = index, error = %e, category = e.category(), "Slice update rejected");
                    return;
                }
            }
        }
    }

    // One attempt per slot: no retry when the price is missing, stale or outside the limit
    fn evaluate(&self, job: &SliceJob) -> SliceUpdate {
        let Some((tick, age)) = self.cache.latest_with_age(job.exchange, &job.pair) else {
            return SliceUpdate::Skipped { reason: SkipReason::NoPrice };
        };
        if age > self.settings.staleness {
            return SliceUpdate::Skipped { reason: SkipReason::StalePrice };
        }

        let price = tick.execution_price(job.side);
        if let Some(limit) = job.limit_price {
            let acceptable = match job.side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            if !acceptable {
                return SliceUpdate::Skipped { reason: SkipReason::LimitPriceNotMet };
            }
        }

        SliceUpdate::Filled { price, at: Utc::now() }
    }
}

// Resolves once cancellation is requested; pends forever if the sender goes away first
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
