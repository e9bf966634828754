//! `procura-ledger`: movement-based warehouse stock accounting.
//!
//! Stock is never stored as an editable number. Every change is one immutable
//! signed [`StockMovement`](movement::StockMovement) at a
//! (warehouse, product, variant) key, and the per-key count is the sum of its
//! movements. This crate holds the pure pieces: movement vocabulary and the
//! planners that turn physical operations (count adjustment, cross-warehouse
//! transfer) into balanced movement batches. Committing batches atomically is
//! the storage layer's job.

pub mod movement;
pub mod plan;

pub use movement::{MovementDraft, MovementType, StockKey, StockMovement, WarehouseStock};
pub use plan::{AdjustmentPlan, TransferItem, plan_adjustment, plan_transfer, validate_movement};
