//! Goods receipts (GRNs) against purchase orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    DomainError, DomainResult, GoodsReceiptId, PurchaseOrderId, PurchaseOrderItemId, TenantId,
};

use crate::order::PurchaseOrder;
use crate::status::GoodsReceiptStatus;

/// One received line on a goods receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptItem {
    pub purchase_order_item_id: PurchaseOrderItemId,
    /// Quantity planned at creation time.
    pub quantity_received: u32,
    /// Final accepted quantity, set when the receipt completes.
    pub quantity_accepted: Option<u32>,
}

impl GoodsReceiptItem {
    /// The quantity this line contributes once the receipt is completed.
    pub fn accepted_or_received(&self) -> u32 {
        self.quantity_accepted.unwrap_or(self.quantity_received)
    }
}

/// A record of physical goods received against a PO, possibly partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceipt {
    pub id: GoodsReceiptId,
    pub tenant_id: TenantId,
    pub purchase_order_id: PurchaseOrderId,
    pub status: GoodsReceiptStatus,
    pub items: Vec<GoodsReceiptItem>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoodsReceipt {
    /// Create a pending receipt. Line-level availability is the caller's
    /// check (it needs the sibling receipts); this validates shape only.
    pub fn new(
        tenant_id: TenantId,
        purchase_order_id: PurchaseOrderId,
        lines: Vec<(PurchaseOrderItemId, u32)>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation(
                "goods receipt requires at least one item",
            ));
        }
        for (idx, (_, quantity)) in lines.iter().enumerate() {
            if *quantity == 0 {
                return Err(DomainError::validation(format!(
                    "receipt item {idx}: quantity_received must be positive"
                )));
            }
        }
        for (idx, (item_id, _)) in lines.iter().enumerate() {
            if lines[..idx].iter().any(|(seen, _)| seen == item_id) {
                return Err(DomainError::validation(format!(
                    "receipt item {idx}: duplicate purchase_order_item_id {item_id}"
                )));
            }
        }

        let items = lines
            .into_iter()
            .map(|(purchase_order_item_id, quantity_received)| GoodsReceiptItem {
                purchase_order_item_id,
                quantity_received,
                quantity_accepted: None,
            })
            .collect();

        Ok(Self {
            id: GoodsReceiptId::new(),
            tenant_id,
            purchase_order_id,
            status: GoodsReceiptStatus::Pending,
            items,
            notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fix accepted quantities at completion time.
    ///
    /// Each line defaults to its planned `quantity_received`; `overrides` may
    /// lower or raise specific lines (the caller bounds raises by
    /// availability). Overrides referencing lines not on this receipt are
    /// rejected.
    pub fn finalize_accepted(
        &mut self,
        overrides: &[(PurchaseOrderItemId, u32)],
    ) -> DomainResult<()> {
        for (item_id, _) in overrides {
            if !self
                .items
                .iter()
                .any(|line| line.purchase_order_item_id == *item_id)
            {
                return Err(DomainError::validation(format!(
                    "accepted quantity override references item {item_id} not on this receipt"
                )));
            }
        }

        for line in &mut self.items {
            let accepted = overrides
                .iter()
                .find(|(item_id, _)| *item_id == line.purchase_order_item_id)
                .map(|(_, quantity)| *quantity)
                .unwrap_or(line.quantity_received);
            line.quantity_accepted = Some(accepted);
        }
        Ok(())
    }

    /// Monetary value of the accepted goods, priced at the order's unit costs.
    ///
    /// Used to sanity-check invoice totals. Lines referencing items missing
    /// from the order are a data fault and error out.
    pub fn accepted_amount(&self, order: &PurchaseOrder) -> DomainResult<u64> {
        let mut total: u64 = 0;
        for line in &self.items {
            let order_item = order.item(line.purchase_order_item_id).ok_or_else(|| {
                DomainError::validation(format!(
                    "receipt line references item {} not on purchase order {}",
                    line.purchase_order_item_id, order.id
                ))
            })?;
            total += u64::from(line.accepted_or_received()) * order_item.unit_cost;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewOrderItem;
    use procura_core::ProductId;

    fn order_with_items(quantities: &[(u32, u64)]) -> PurchaseOrder {
        let items = quantities
            .iter()
            .map(|&(quantity, unit_cost)| NewOrderItem {
                product_id: ProductId::new(),
                variant_id: None,
                ordered_quantity: quantity,
                unit_cost,
            })
            .collect();
        PurchaseOrder::new(TenantId::new(), None, items, Utc::now()).unwrap()
    }

    #[test]
    fn new_receipt_starts_pending_with_unset_accepted() {
        let order = order_with_items(&[(10, 100)]);
        let receipt = GoodsReceipt::new(
            order.tenant_id,
            order.id,
            vec![(order.items[0].id, 4)],
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(receipt.status, GoodsReceiptStatus::Pending);
        assert_eq!(receipt.items[0].quantity_received, 4);
        assert_eq!(receipt.items[0].quantity_accepted, None);
        assert_eq!(receipt.items[0].accepted_or_received(), 4);
    }

    #[test]
    fn empty_and_zero_quantity_receipts_are_rejected() {
        let order = order_with_items(&[(10, 100)]);
        assert!(GoodsReceipt::new(order.tenant_id, order.id, vec![], None, Utc::now()).is_err());
        assert!(
            GoodsReceipt::new(
                order.tenant_id,
                order.id,
                vec![(order.items[0].id, 0)],
                None,
                Utc::now()
            )
            .is_err()
        );
    }

    #[test]
    fn duplicate_lines_are_rejected() {
        let order = order_with_items(&[(10, 100)]);
        let item_id = order.items[0].id;
        let err = GoodsReceipt::new(
            order.tenant_id,
            order.id,
            vec![(item_id, 2), (item_id, 3)],
            None,
            Utc::now(),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("duplicate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn finalize_defaults_accepted_to_received() {
        let order = order_with_items(&[(10, 100), (5, 100)]);
        let mut receipt = GoodsReceipt::new(
            order.tenant_id,
            order.id,
            vec![(order.items[0].id, 6), (order.items[1].id, 5)],
            None,
            Utc::now(),
        )
        .unwrap();

        receipt
            .finalize_accepted(&[(order.items[0].id, 4)])
            .unwrap();
        assert_eq!(receipt.items[0].quantity_accepted, Some(4));
        assert_eq!(receipt.items[1].quantity_accepted, Some(5));
    }

    #[test]
    fn finalize_rejects_unknown_override_line() {
        let order = order_with_items(&[(10, 100)]);
        let mut receipt = GoodsReceipt::new(
            order.tenant_id,
            order.id,
            vec![(order.items[0].id, 6)],
            None,
            Utc::now(),
        )
        .unwrap();

        let err = receipt
            .finalize_accepted(&[(PurchaseOrderItemId::new(), 1)])
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("not on this receipt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepted_amount_prices_lines_at_order_unit_cost() {
        let order = order_with_items(&[(10, 250), (4, 1000)]);
        let mut receipt = GoodsReceipt::new(
            order.tenant_id,
            order.id,
            vec![(order.items[0].id, 6), (order.items[1].id, 4)],
            None,
            Utc::now(),
        )
        .unwrap();

        // Planned quantities before completion.
        assert_eq!(receipt.accepted_amount(&order).unwrap(), 6 * 250 + 4 * 1000);

        receipt
            .finalize_accepted(&[(order.items[0].id, 5)])
            .unwrap();
        assert_eq!(receipt.accepted_amount(&order).unwrap(), 5 * 250 + 4 * 1000);
    }
}
