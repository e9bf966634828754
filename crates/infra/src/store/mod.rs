//! Storage backends behind the [`ProcurementStore`] and [`LedgerStore`]
//! traits.

mod in_memory;
mod postgres;
mod traits;

pub use in_memory::{InMemoryLedgerStore, InMemoryProcurementStore};
pub use postgres::{PostgresLedgerStore, PostgresProcurementStore, run_migrations};
pub use traits::{LedgerStore, ProcurementStore, StoreError, StoreResult};
