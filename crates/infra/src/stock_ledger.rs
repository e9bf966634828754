//! Movement-based stock accounting over an injected store.
//!
//! The ledger is the sole source of truth for stock: a count is the sum of
//! its key's signed movements, and the store folds each committed batch into
//! the materialized per-key counts in the same atomic commit.

use chrono::Utc;
use tracing::instrument;

use procura_core::{TenantId, UserId};
use procura_ledger::{MovementDraft, StockKey, StockMovement, WarehouseStock};

use crate::error::ServiceError;
use crate::store::{LedgerStore, StoreError};

/// Append-only stock ledger.
#[derive(Debug, Clone)]
pub struct StockLedger<L> {
    store: L,
}

impl<L: LedgerStore> StockLedger<L> {
    pub fn new(store: L) -> Self {
        Self { store }
    }

    /// Commit a draft batch as one atomic unit.
    ///
    /// Every draft is stamped with the same commit time and actor. Returns
    /// the committed movements and the post-commit stock row for each touched
    /// key, in first-touch order.
    #[instrument(
        skip(self, drafts),
        fields(tenant_id = %tenant_id.as_uuid(), batch_len = drafts.len()),
        err
    )]
    pub async fn record(
        &self,
        tenant_id: TenantId,
        drafts: Vec<MovementDraft>,
        actor: UserId,
    ) -> Result<(Vec<StockMovement>, Vec<WarehouseStock>), ServiceError> {
        let now = Utc::now();
        let movements: Vec<StockMovement> = drafts
            .into_iter()
            .map(|draft| StockMovement::from_draft(draft, tenant_id, actor, now))
            .collect();

        let stocks = self.store.append(tenant_id, movements.clone()).await?;
        Ok((movements, stocks))
    }

    /// Commit a single draft and return its movement with the updated stock.
    pub async fn record_one(
        &self,
        tenant_id: TenantId,
        draft: MovementDraft,
        actor: UserId,
    ) -> Result<(StockMovement, WarehouseStock), ServiceError> {
        let (movements, stocks) = self.record(tenant_id, vec![draft], actor).await?;
        let movement = movements
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("commit returned no movement".to_string()))?;
        let stock = stocks
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("commit returned no stock row".to_string()))?;
        Ok((movement, stock))
    }

    /// Current count at a key; zero when the key has never moved.
    pub async fn current_stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<i64, ServiceError> {
        Ok(self
            .store
            .stock(tenant_id, key)
            .await?
            .map(|stock| stock.stock_count)
            .unwrap_or(0))
    }

    /// Materialized stock row at a key, if the key has ever moved.
    pub async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<WarehouseStock>, ServiceError> {
        Ok(self.store.stock(tenant_id, key).await?)
    }

    /// Movement history for a key, newest first.
    pub async fn history(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Vec<StockMovement>, ServiceError> {
        Ok(self.store.movements_for_key(tenant_id, key).await?)
    }
}
