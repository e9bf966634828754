//! Multi-step physical inventory operations.
//!
//! The orchestrator reads, plans with the pure planners, and commits the
//! planned batch through [`StockLedger`] as one unit. It holds no state of
//! its own; a failed plan writes nothing.

use tracing::instrument;
use uuid::Uuid;

use procura_core::{StockMovementId, TenantId, UserId, WarehouseId};
use procura_ledger::{
    AdjustmentPlan, MovementDraft, MovementType, StockKey, StockMovement, TransferItem,
    WarehouseStock, plan_adjustment, plan_transfer, validate_movement,
};

use crate::error::ServiceError;
use crate::stock_ledger::StockLedger;
use crate::store::LedgerStore;

/// Result of an adjust-to-physical-count request.
#[derive(Debug, Clone)]
pub struct AdjustOutcome {
    /// Absent when the count already matched and nothing was written.
    pub movement_id: Option<StockMovementId>,
    pub delta: i64,
    pub stock_count: i64,
    pub already_matches: bool,
}

/// Result of a committed cross-warehouse transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transfer_ref: String,
    pub movements: Vec<StockMovement>,
    pub stocks: Vec<WarehouseStock>,
}

/// Result of a directly recorded movement.
#[derive(Debug, Clone)]
pub struct MovementRecord {
    pub movement: StockMovement,
    pub stock: WarehouseStock,
}

/// Composes ledger commits into all-or-nothing physical operations.
#[derive(Debug, Clone)]
pub struct InventoryOrchestrator<L> {
    ledger: StockLedger<L>,
}

impl<L: LedgerStore> InventoryOrchestrator<L> {
    pub fn new(ledger: StockLedger<L>) -> Self {
        Self { ledger }
    }

    /// Direct read access to the underlying ledger.
    pub fn ledger(&self) -> &StockLedger<L> {
        &self.ledger
    }

    /// Adjust one key toward a counted physical quantity.
    ///
    /// A matching count writes nothing and reports so; otherwise exactly one
    /// ADJUSTMENT movement closes the gap.
    #[instrument(
        skip(self, reason),
        fields(tenant_id = %tenant_id.as_uuid(), physical_quantity),
        err
    )]
    pub async fn adjust_stock(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        physical_quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> Result<AdjustOutcome, ServiceError> {
        let current = self.ledger.current_stock(tenant_id, &key).await?;
        match plan_adjustment(key, current, physical_quantity, reason)? {
            AdjustmentPlan::AlreadyMatches { stock_count } => Ok(AdjustOutcome {
                movement_id: None,
                delta: 0,
                stock_count,
                already_matches: true,
            }),
            AdjustmentPlan::Movement { draft, delta } => {
                let (movement, stock) = self.ledger.record_one(tenant_id, draft, actor).await?;
                Ok(AdjustOutcome {
                    movement_id: Some(movement.id),
                    delta,
                    stock_count: stock.stock_count,
                    already_matches: false,
                })
            }
        }
    }

    /// Move items between two warehouses.
    ///
    /// Each item lands as a TRANSFER_OUT / TRANSFER_IN pair of equal
    /// magnitude, committed with the whole batch or not at all.
    #[instrument(
        skip(self, items, notes),
        fields(
            tenant_id = %tenant_id.as_uuid(),
            source = %source.as_uuid(),
            destination = %destination.as_uuid(),
            item_count = items.len()
        ),
        err
    )]
    pub async fn transfer_stock(
        &self,
        tenant_id: TenantId,
        source: WarehouseId,
        destination: WarehouseId,
        items: &[TransferItem],
        notes: Option<&str>,
        actor: UserId,
    ) -> Result<TransferOutcome, ServiceError> {
        let transfer_ref = Uuid::now_v7().to_string();
        let drafts = plan_transfer(source, destination, items, &transfer_ref, notes)?;
        let (movements, stocks) = self.ledger.record(tenant_id, drafts, actor).await?;
        Ok(TransferOutcome {
            transfer_ref,
            movements,
            stocks,
        })
    }

    /// Record one pre-classified movement (order-driven debits, returns and
    /// the like). Quantity is signed by the caller.
    #[instrument(
        skip(self, reference_type, reference_id, notes),
        fields(tenant_id = %tenant_id.as_uuid(), movement_type = %movement_type, quantity),
        err
    )]
    pub async fn record_movement(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        movement_type: MovementType,
        quantity: i64,
        reference_type: Option<String>,
        reference_id: Option<String>,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<MovementRecord, ServiceError> {
        validate_movement(quantity)?;
        let draft = MovementDraft {
            key,
            movement_type,
            quantity,
            reference_type,
            reference_id,
            notes,
        };
        let (movement, stock) = self.ledger.record_one(tenant_id, draft, actor).await?;
        Ok(MovementRecord { movement, stock })
    }
}
