//! Purchase orders and their line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    DomainError, DomainResult, ProductId, PurchaseOrderId, PurchaseOrderItemId, SupplierId,
    TenantId, VariantId,
};

use crate::status::PurchaseOrderStatus;

/// One ordered line on a purchase order.
///
/// `received_quantity` is deliberately absent: it is always derived from the
/// order's goods receipts, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub ordered_quantity: u32,
    /// Price per unit in smallest currency unit (e.g. cents).
    pub unit_cost: u64,
}

/// Line input for creating a purchase order (no identity yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub ordered_quantity: u32,
    pub unit_cost: u64,
}

/// A commitment to buy specified quantities from a supplier.
///
/// Mutated only through table-gated status changes; `version` backs the
/// optimistic concurrency check and is bumped by the store on every commit
/// that touches the order or its receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub tenant_id: TenantId,
    pub supplier_id: Option<SupplierId>,
    pub status: PurchaseOrderStatus,
    pub items: Vec<PurchaseOrderItem>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Create a draft order with fresh line identities.
    pub fn new(
        tenant_id: TenantId,
        supplier_id: Option<SupplierId>,
        items: Vec<NewOrderItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "purchase order requires at least one item",
            ));
        }
        for (idx, item) in items.iter().enumerate() {
            if item.ordered_quantity == 0 {
                return Err(DomainError::validation(format!(
                    "order item {idx}: ordered_quantity must be positive"
                )));
            }
        }

        let items = items
            .into_iter()
            .map(|item| PurchaseOrderItem {
                id: PurchaseOrderItemId::new(),
                product_id: item.product_id,
                variant_id: item.variant_id,
                ordered_quantity: item.ordered_quantity,
                unit_cost: item.unit_cost,
            })
            .collect();

        Ok(Self {
            id: PurchaseOrderId::new(),
            tenant_id,
            supplier_id,
            status: PurchaseOrderStatus::Draft,
            items,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn item(&self, id: PurchaseOrderItemId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|item| item.id == id)
    }
}
