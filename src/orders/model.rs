// TWAP order, slice schedule and derived order state

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::types::{Exchange, Side, TradingPair};

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Submission parameters as they arrive from a caller, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub order_id: String,
    pub exchange: String,
    /// Pair in either of the exchange's representations, or `BASE/QUOTE`
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub execution_window: Duration,
    pub slice_interval: Duration,
    pub limit_price: Option<f64>,
}

/// An accepted order. Immutable; progress lives in its slices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwapOrder {
    pub order_id: String,
    pub exchange: Exchange,
    pub pair: TradingPair,
    /// Streaming representation of `pair` on `exchange`
    pub symbol: String,
    pub side: Side,
    pub total_quantity: f64,
    #[serde(rename = "execution_window_secs", serialize_with = "as_secs")]
    pub execution_window: Duration,
    #[serde(rename = "slice_interval_secs", serialize_with = "as_secs")]
    pub slice_interval: Duration,
    pub limit_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceOutcome {
    Pending,
    Filled,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoPrice,
    StalePrice,
    LimitPriceNotMet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSlice {
    pub index: usize,
    /// Offset from order acceptance
    #[serde(rename = "offset_secs", serialize_with = "as_secs")]
    pub offset: Duration,
    pub scheduled_at: DateTime<Utc>,
    pub quantity: f64,
    pub outcome: SliceOutcome,
    pub fill_price: Option<f64>,
    pub filled_at: Option<DateTime<Utc>>,
    pub skip_reason: Option<SkipReason>,
}

impl ExecutionSlice {
    pub fn is_resolved(&self) -> bool {
        self.outcome != SliceOutcome::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    InProgress,
    Completed,
    Partial,
    Cancelled,
}

impl OrderState {
    /// Derive the state from the slice outcomes; never stored
    pub fn derive(slices: &[ExecutionSlice], cancelled: bool) -> Self {
        if cancelled {
            return OrderState::Cancelled;
        }
        let resolved = slices.iter().filter(|slice| slice.is_resolved()).count();
        if resolved == 0 {
            OrderState::Pending
        } else if resolved < slices.len() {
            OrderState::InProgress
        } else if slices.iter().all(|slice| slice.outcome == SliceOutcome::Filled) {
            OrderState::Completed
        } else {
            OrderState::Partial
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Partial | OrderState::Cancelled)
    }
}

/// `ceil(window / interval)`, computed on whole nanoseconds. Saturates at `usize::MAX`.
pub fn slice_count(execution_window: Duration, slice_interval: Duration) -> usize {
    let window = execution_window.as_nanos();
    let interval = slice_interval.as_nanos();
    if window == 0 || interval == 0 {
        return 0;
    }
    usize::try_from(window.div_ceil(interval)).unwrap_or(usize::MAX)
}

/// Wall-clock time `offset` after `start`, or `None` past the range of `DateTime<Utc>`
pub fn offset_time(start: DateTime<Utc>, offset: Duration) -> Option<DateTime<Utc>> {
    let offset = chrono::Duration::from_std(offset).ok()?;
    start.checked_add_signed(offset)
}

/// Split `total` into `count` slices of `floor(total / count)` lots of `step`, with the
/// remainder on the last slice so the slices add up to `total`.
pub fn slice_quantities(total: f64, count: usize, step: f64) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let per_slice = if step > 0.0 {
        // nudge so that 100 / 4 lots does not floor to 24.999...
        ((total / step / count as f64) + 1e-9).floor() * step
    } else {
        total / count as f64
    };

    let mut quantities = vec![per_slice; count - 1];
    let allotted: f64 = quantities.iter().sum();
    quantities.push(total - allotted);
    quantities
}

/// Eagerly build the full schedule for `order`; slice `i` fires at `i * slice_interval`.
///
/// Callers bound the slice count and check that `created_at + execution_window` is
/// representable before building; offsets past that range pin to `DateTime::<Utc>::MAX_UTC`.
pub fn build_slices(order: &TwapOrder, quantity_step: f64) -> Vec<ExecutionSlice> {
    let count = slice_count(order.execution_window, order.slice_interval);
    slice_quantities(order.total_quantity, count, quantity_step)
        .into_iter()
        .enumerate()
        .map(|(index, quantity)| {
            let offset = u32::try_from(index)
                .ok()
                .and_then(|index| order.slice_interval.checked_mul(index))
                .unwrap_or(Duration::MAX);
            let scheduled_at = offset_time(order.created_at, offset).unwrap_or(DateTime::<Utc>::MAX_UTC);
            ExecutionSlice {
                index,
                offset,
                scheduled_at,
                quantity,
                outcome: SliceOutcome::Pending,
                fill_price: None,
                filled_at: None,
                skip_reason: None,
            }
        })
        .collect()
}

/// Registry-owned state of one order
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: TwapOrder,
    pub slices: Vec<ExecutionSlice>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    pub fn new(order: TwapOrder, slices: Vec<ExecutionSlice>) -> Self {
        Self { order, slices, cancelled_at: None }
    }

    pub fn state(&self) -> OrderState {
        OrderState::derive(&self.slices, self.cancelled_at.is_some())
    }

    fn filled(&self) -> impl Iterator<Item = &ExecutionSlice> {
        self.slices.iter().filter(|slice| slice.outcome == SliceOutcome::Filled)
    }

    pub fn filled_quantity(&self) -> f64 {
        self.filled().map(|slice| slice.quantity).sum()
    }

    /// Quantity-weighted average over filled slices
    pub fn average_fill_price(&self) -> Option<f64> {
        let quantity = self.filled_quantity();
        if quantity <= 0.0 {
            return None;
        }
        let notional: f64 = self
            .filled()
            .map(|slice| slice.quantity * slice.fill_price.unwrap_or(0.0))
            .sum();
        Some(notional / quantity)
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            order: self.order.clone(),
            state: self.state(),
            filled_quantity: self.filled_quantity(),
            average_fill_price: self.average_fill_price(),
            cancelled_at: self.cancelled_at,
            slices: self.slices.clone(),
        }
    }

    pub fn summary(&self) -> OrderSummary {
        let count = |outcome: SliceOutcome| self.slices.iter().filter(|s| s.outcome == outcome).count();
        OrderSummary {
            order_id: self.order.order_id.clone(),
            exchange: self.order.exchange,
            pair: self.order.pair.clone(),
            side: self.order.side,
            total_quantity: self.order.total_quantity,
            filled_quantity: self.filled_quantity(),
            state: self.state(),
            slices_total: self.slices.len(),
            slices_filled: count(SliceOutcome::Filled),
            slices_skipped: count(SliceOutcome::Skipped),
            average_fill_price: self.average_fill_price(),
            created_at: self.order.created_at,
        }
    }
}

/// Consistent copy of an order and all its slices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    #[serde(flatten)]
    pub order: TwapOrder,
    pub state: OrderState,
    pub filled_quantity: f64,
    pub average_fill_price: Option<f64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub slices: Vec<ExecutionSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub exchange: Exchange,
    pub pair: TradingPair,
    pub side: Side,
    pub total_quantity: f64,
    pub filled_quantity: f64,
    pub state: OrderState,
    pub slices_total: usize,
    pub slices_filled: usize,
    pub slices_skipped: usize,
    pub average_fill_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}
