// TWAP orders: model, registry and scheduler

pub mod model;
pub mod registry;
pub mod scheduler;

pub use model::{
    build_slices, offset_time, slice_count, slice_quantities, ExecutionSlice, OrderRecord, OrderRequest, OrderSnapshot,
    OrderState, OrderSummary, SkipReason, SliceOutcome, TwapOrder,
};
pub use registry::{OrderRegistry, SliceUpdate};
pub use scheduler::{SchedulerSettings, TwapScheduler};
