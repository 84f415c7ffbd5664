// Authoritative in-memory table of TWAP orders

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::model::{OrderRecord, OrderSnapshot, OrderState, OrderSummary, SkipReason, SliceOutcome};
use crate::error::{TwapError, TwapResult, ValidationError};

/// Resolution applied to one pending slice
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceUpdate {
    Filled { price: f64, at: DateTime<Utc> },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, OrderRecord>,
    insertion_order: Vec<String>,
}

/// Owns every order and its slices. Readers always get a copy taken under the lock, so a
/// status query never sees a half-applied slice update.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    inner: RwLock<Inner>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: OrderRecord) -> TwapResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let order_id = record.order.order_id.clone();
        if inner.records.contains_key(&order_id) {
            return Err(ValidationError::DuplicateOrderId(order_id).into());
        }
        inner.insertion_order.push(order_id.clone());
        inner.records.insert(order_id, record);
        Ok(())
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .records
            .contains_key(order_id)
    }

    pub fn get(&self, order_id: &str) -> TwapResult<OrderSnapshot> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .records
            .get(order_id)
            .map(OrderRecord::snapshot)
            .ok_or_else(|| TwapError::NotFound(format!("order '{}'", order_id)))
    }

    /// Summaries in insertion order
    pub fn list_all(&self) -> Vec<OrderSummary> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .insertion_order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .map(OrderRecord::summary)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve slice `index` of `order_id` and return the order state that results.
    ///
    /// Slices must be resolved in index order and only once. A cancelled order is left
    /// untouched and reported as [`OrderState::Cancelled`].
    pub fn mutate_slice(&self, order_id: &str, index: usize, update: SliceUpdate) -> TwapResult<OrderState> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .get_mut(order_id)
            .ok_or_else(|| TwapError::NotFound(format!("order '{}'", order_id)))?;

        if record.cancelled_at.is_some() {
            return Ok(OrderState::Cancelled);
        }
        if index >= record.slices.len() {
            return Err(TwapError::InvariantViolation(format!(
                "order '{}' has no slice {}",
                order_id, index
            )));
        }
        if record.slices[..index].iter().any(|slice| !slice.is_resolved()) {
            return Err(TwapError::InvariantViolation(format!(
                "order '{}' slice {} resolved before an earlier slice",
                order_id, index
            )));
        }

        let slice = &mut record.slices[index];
        if slice.is_resolved() {
            return Err(TwapError::InvariantViolation(format!(
                "order '{}' slice {} already resolved",
                order_id, index
            )));
        }

        match update {
            SliceUpdate::Filled { price, at } => {
                slice.outcome = SliceOutcome::Filled;
                slice.fill_price = Some(price);
                slice.filled_at = Some(at);
            }
            SliceUpdate::Skipped { reason } => {
                slice.outcome = SliceOutcome::Skipped;
                slice.skip_reason = Some(reason);
            }
        }
        Ok(record.state())
    }

    /// Move a `pending` or `in_progress` order to `cancelled`
    pub fn mark_cancelled(&self, order_id: &str) -> TwapResult<OrderSnapshot> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .get_mut(order_id)
            .ok_or_else(|| TwapError::NotFound(format!("order '{}'", order_id)))?;

        if record.state().is_terminal() {
            return Err(ValidationError::OrderNotCancellable(order_id.to_string()).into());
        }
        record.cancelled_at = Some(Utc::now());
        Ok(record.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::model::{build_slices, TwapOrder};
    use crate::types::{Exchange, Side, TradingPair};
    use std::time::Duration;

    fn record(order_id: &str) -> OrderRecord {
        let order = TwapOrder {
            order_id: order_id.to_string(),
            exchange: Exchange::Binance,
            pair: TradingPair::new("BTC", "USDT"),
            symbol: "BTCUSDT".to_string(),
            side: Side::Sell,
            total_quantity: 10.0,
            execution_window: Duration::from_secs(100),
            slice_interval: Duration::from_secs(40),
            limit_price: None,
            created_at: Utc::now(),
        };
        let slices = build_slices(&order, 1.0);
        OrderRecord::new(order, slices)
    }

    #[test]
    fn test_duplicate_insert_leaves_first_untouched() {
        let registry = OrderRegistry::new();
        registry.insert(record("a")).unwrap();
        registry
            .mutate_slice("a", 0, SliceUpdate::Filled { price: 1.0, at: Utc::now() })
            .unwrap();

        let err = registry.insert(record("a")).unwrap_err();
        assert!(matches!(err, TwapError::Validation(ValidationError::DuplicateOrderId(_))));
        assert_eq!(registry.get("a").unwrap().filled_quantity, 3.0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_slices_resolve_in_order_once() {
        let registry = OrderRegistry::new();
        registry.insert(record("a")).unwrap();

        let skip = SliceUpdate::Skipped { reason: SkipReason::NoPrice };
        assert!(matches!(registry.mutate_slice("a", 1, skip), Err(TwapError::InvariantViolation(_))));
        assert_eq!(registry.mutate_slice("a", 0, skip).unwrap(), OrderState::InProgress);
        assert!(matches!(registry.mutate_slice("a", 0, skip), Err(TwapError::InvariantViolation(_))));
        assert!(matches!(registry.mutate_slice("a", 9, skip), Err(TwapError::InvariantViolation(_))));
        assert!(matches!(registry.mutate_slice("zz", 0, skip), Err(TwapError::NotFound(_))));

        registry.mutate_slice("a", 1, skip).unwrap();
        assert_eq!(registry.mutate_slice("a", 2, skip).unwrap(), OrderState::Partial);
    }

    #[test]
    fn test_cancel_rules() {
        let registry = OrderRegistry::new();
        registry.insert(record("a")).unwrap();

        let snapshot = registry.mark_cancelled("a").unwrap();
        assert_eq!(snapshot.state, OrderState::Cancelled);
        assert!(snapshot.cancelled_at.is_some());

        let fill = SliceUpdate::Filled { price: 1.0, at: Utc::now() };
        assert_eq!(registry.mutate_slice("a", 0, fill).unwrap(), OrderState::Cancelled);
        assert!(matches!(
            registry.mark_cancelled("a"),
            Err(TwapError::Validation(ValidationError::OrderNotCancellable(_)))
        ));
        assert!(matches!(registry.mark_cancelled("missing"), Err(TwapError::NotFound(_))));
    }

    #[test]
    fn test_list_all_keeps_insertion_order() {
        let registry = OrderRegistry::new();
        for id in ["c", "a", "b"] {
            registry.insert(record(id)).unwrap();
        }
        let ids: Vec<String> = registry.list_all().into_iter().map(|s| s.order_id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
