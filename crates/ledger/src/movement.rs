//! Stock movement vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{ProductId, StockMovementId, TenantId, UserId, VariantId, WarehouseId};

/// Classification of a stock movement.
///
/// Wire names are SCREAMING_SNAKE, matching the movement records consumers
/// already parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Correction toward a physical count.
    Adjustment,
    /// Stock arriving at the destination of a transfer.
    TransferIn,
    /// Stock leaving the source of a transfer.
    TransferOut,
    /// Stock committed to an outbound order.
    Order,
    /// Stock received from a supplier.
    Purchase,
    /// Stock returned into the warehouse.
    Return,
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::TransferIn => "TRANSFER_IN",
            MovementType::TransferOut => "TRANSFER_OUT",
            MovementType::Order => "ORDER",
            MovementType::Purchase => "PURCHASE",
            MovementType::Return => "RETURN",
        };
        write!(f, "{s}")
    }
}

/// The (warehouse, product, variant) coordinate a stock count lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

impl StockKey {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            warehouse_id,
            product_id,
            variant_id,
        }
    }
}

/// A movement before it is committed: no id or timestamp yet.
///
/// Planners produce drafts; the ledger assigns identity and commit time when
/// the batch lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Signed quantity. Positive adds stock at the key, negative removes it.
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

/// One committed, immutable stock movement.
///
/// Corrections are new offsetting movements; a committed movement is never
/// edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub movement_type: MovementType,
    /// Signed quantity in stock units.
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Materialize a draft into a committed movement record.
    pub fn from_draft(
        draft: MovementDraft,
        tenant_id: TenantId,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StockMovementId::new(),
            tenant_id,
            warehouse_id: draft.key.warehouse_id,
            product_id: draft.key.product_id,
            variant_id: draft.key.variant_id,
            movement_type: draft.movement_type,
            quantity: draft.quantity,
            reference_type: draft.reference_type,
            reference_id: draft.reference_id,
            notes: draft.notes,
            created_by,
            created_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id, self.variant_id)
    }
}

/// Materialized stock count for one key.
///
/// This is a projection of the movement log, kept in lockstep by the store:
/// `stock_count` always equals the sum of signed quantities over the key's
/// movements. Writing it outside a movement commit is a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub stock_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl WarehouseStock {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse_id, self.product_id, self.variant_id)
    }
}
