//! `procura-infra`: storage and orchestration for the procurement chain and
//! the stock ledger.
//!
//! The domain crates decide; this crate loads, gates, commits and retries.
//! Stores are trait-shaped so every component takes an injected backend:
//! in-memory for tests and dev, Postgres for persistent runs.

pub mod error;
pub mod orchestrator;
pub mod procurement_service;
pub mod stock_ledger;
pub mod store;

pub use error::ServiceError;
pub use orchestrator::{AdjustOutcome, InventoryOrchestrator, MovementRecord, TransferOutcome};
pub use procurement_service::{OrderDetail, ProcurementService};
pub use stock_ledger::StockLedger;
pub use store::{
    InMemoryLedgerStore, InMemoryProcurementStore, LedgerStore, PostgresLedgerStore,
    PostgresProcurementStore, ProcurementStore, StoreError, StoreResult,
};
