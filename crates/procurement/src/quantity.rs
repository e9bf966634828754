//! Quantity reconciliation: how much of each ordered line is still
//! receivable.
//!
//! The authoritative inputs are the order's goods receipts. Completed
//! receipts count their accepted quantities, pending and inspected receipts
//! hold their planned quantities, rejected receipts contribute nothing.
//! Derived PO received totals come from the same walk; there is no stored
//! counter to drift.

use std::collections::BTreeMap;

use procura_core::{DomainError, DomainResult, GoodsReceiptId, PurchaseOrderItemId};

use crate::order::PurchaseOrder;
use crate::receipt::GoodsReceipt;
use crate::status::{GoodsReceiptStatus, PurchaseOrderStatus};

/// Per-line receivability figures for one purchase order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemAvailability {
    pub ordered_quantity: u32,
    /// Accepted across completed receipts.
    pub accepted_total: u32,
    /// Planned across pending/inspected receipts.
    pub in_flight_total: u32,
}

impl ItemAvailability {
    /// Quantity a new receipt may still claim for this line.
    pub fn available(&self) -> u32 {
        self.ordered_quantity
            .saturating_sub(self.accepted_total.saturating_add(self.in_flight_total))
    }

    /// Everything already counted against the line, committed or in flight.
    pub fn committed(&self) -> u32 {
        self.accepted_total.saturating_add(self.in_flight_total)
    }
}

/// Compute per-line availability for an order given all of its receipts.
///
/// `excluding` drops one receipt from the walk, used when revalidating a
/// receipt's own quantities so it does not count against itself.
pub fn availability(
    order: &PurchaseOrder,
    receipts: &[GoodsReceipt],
    excluding: Option<GoodsReceiptId>,
) -> BTreeMap<PurchaseOrderItemId, ItemAvailability> {
    let mut map: BTreeMap<PurchaseOrderItemId, ItemAvailability> = order
        .items
        .iter()
        .map(|item| {
            (
                item.id,
                ItemAvailability {
                    ordered_quantity: item.ordered_quantity,
                    ..ItemAvailability::default()
                },
            )
        })
        .collect();

    for receipt in receipts {
        if receipt.purchase_order_id != order.id {
            continue;
        }
        if Some(receipt.id) == excluding {
            continue;
        }
        for line in &receipt.items {
            let Some(entry) = map.get_mut(&line.purchase_order_item_id) else {
                continue;
            };
            match receipt.status {
                GoodsReceiptStatus::Completed => {
                    entry.accepted_total = entry
                        .accepted_total
                        .saturating_add(line.accepted_or_received());
                }
                status if status.holds_quantity() => {
                    entry.in_flight_total =
                        entry.in_flight_total.saturating_add(line.quantity_received);
                }
                // Rejected (and approved-but-not-completed) receipts hold
                // nothing against the line.
                _ => {}
            }
        }
    }

    map
}

/// Gate requested receipt quantities line-by-line against availability.
///
/// Each error names the ordered, already-committed and requested amounts and
/// the exact remaining figure.
pub fn ensure_receivable(
    order: &PurchaseOrder,
    receipts: &[GoodsReceipt],
    requested: &[(PurchaseOrderItemId, u32)],
    excluding: Option<GoodsReceiptId>,
) -> DomainResult<()> {
    let map = availability(order, receipts, excluding);

    for (item_id, quantity) in requested {
        let entry = map.get(item_id).ok_or_else(|| {
            DomainError::validation(format!(
                "purchase order {} has no item {item_id}",
                order.id
            ))
        })?;

        if *quantity > entry.available() {
            return Err(DomainError::validation(format!(
                "quantity over limit for purchase order item {item_id}: requested {quantity}, \
                 ordered {}, already committed {} (remaining available = {})",
                entry.ordered_quantity,
                entry.committed(),
                entry.available()
            )));
        }
    }

    Ok(())
}

/// Derived received quantity per line: accepted across completed receipts.
pub fn received_totals(
    order: &PurchaseOrder,
    receipts: &[GoodsReceipt],
) -> BTreeMap<PurchaseOrderItemId, u32> {
    availability(order, receipts, None)
        .into_iter()
        .map(|(item_id, entry)| (item_id, entry.accepted_total))
        .collect()
}

/// Receiving progress a completed receipt may roll the order forward to.
///
/// `Received` when every line is fully accepted, `PartiallyReceived` when
/// anything has landed, `None` when nothing has. The caller only applies the
/// result where the order's transition table permits it.
pub fn order_progress(
    order: &PurchaseOrder,
    receipts: &[GoodsReceipt],
) -> Option<PurchaseOrderStatus> {
    let map = availability(order, receipts, None);

    let mut any_received = false;
    let mut all_received = true;
    for item in &order.items {
        let accepted = map.get(&item.id).map(|e| e.accepted_total).unwrap_or(0);
        if accepted > 0 {
            any_received = true;
        }
        if accepted < item.ordered_quantity {
            all_received = false;
        }
    }

    if all_received {
        Some(PurchaseOrderStatus::Received)
    } else if any_received {
        Some(PurchaseOrderStatus::PartiallyReceived)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewOrderItem;
    use chrono::Utc;
    use proptest::prelude::*;
    use procura_core::{ProductId, TenantId};

    fn order(quantities: &[u32]) -> PurchaseOrder {
        let items = quantities
            .iter()
            .map(|&quantity| NewOrderItem {
                product_id: ProductId::new(),
                variant_id: None,
                ordered_quantity: quantity,
                unit_cost: 100,
            })
            .collect();
        PurchaseOrder::new(TenantId::new(), None, items, Utc::now()).unwrap()
    }

    fn receipt_with_status(
        order: &PurchaseOrder,
        lines: Vec<(PurchaseOrderItemId, u32)>,
        status: GoodsReceiptStatus,
    ) -> GoodsReceipt {
        let mut receipt =
            GoodsReceipt::new(order.tenant_id, order.id, lines, None, Utc::now()).unwrap();
        if status == GoodsReceiptStatus::Completed {
            receipt.finalize_accepted(&[]).unwrap();
        }
        receipt.status = status;
        receipt
    }

    #[test]
    fn completed_and_in_flight_receipts_reduce_availability() {
        let order = order(&[100]);
        let item = order.items[0].id;

        let completed = receipt_with_status(&order, vec![(item, 60)], GoodsReceiptStatus::Completed);
        let pending = receipt_with_status(&order, vec![(item, 15)], GoodsReceiptStatus::Pending);

        let map = availability(&order, &[completed, pending], None);
        let entry = map[&item];
        assert_eq!(entry.accepted_total, 60);
        assert_eq!(entry.in_flight_total, 15);
        assert_eq!(entry.available(), 25);
    }

    #[test]
    fn rejected_receipts_contribute_nothing() {
        let order = order(&[50]);
        let item = order.items[0].id;

        let rejected = receipt_with_status(&order, vec![(item, 50)], GoodsReceiptStatus::Rejected);
        let map = availability(&order, &[rejected], None);
        assert_eq!(map[&item].available(), 50);
    }

    #[test]
    fn over_receipt_is_rejected_with_the_remaining_figure() {
        // ordered 100, 60 accepted on a completed receipt, a new receipt asks
        // for 50: rejected, remaining available = 40.
        let order = order(&[100]);
        let item = order.items[0].id;
        let completed = receipt_with_status(&order, vec![(item, 60)], GoodsReceiptStatus::Completed);

        let err = ensure_receivable(&order, &[completed.clone()], &[(item, 50)], None).unwrap_err();
        match err {
            DomainError::Validation(msg) => {
                assert!(msg.contains("requested 50"));
                assert!(msg.contains("ordered 100"));
                assert!(msg.contains("already committed 60"));
                assert!(msg.contains("remaining available = 40"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(ensure_receivable(&order, &[completed], &[(item, 40)], None).is_ok());
    }

    #[test]
    fn unknown_line_is_rejected() {
        let order = order(&[10]);
        let err =
            ensure_receivable(&order, &[], &[(PurchaseOrderItemId::new(), 1)], None).unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("has no item")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn excluding_a_receipt_frees_its_own_quantities() {
        let order = order(&[100]);
        let item = order.items[0].id;
        let mine = receipt_with_status(&order, vec![(item, 70)], GoodsReceiptStatus::Inspected);

        // Counting itself, nothing is left for a 70-unit revalidation.
        assert!(ensure_receivable(&order, std::slice::from_ref(&mine), &[(item, 70)], None).is_err());
        // Excluding itself, its own quantities are free again.
        assert!(
            ensure_receivable(&order, std::slice::from_ref(&mine), &[(item, 70)], Some(mine.id))
                .is_ok()
        );
    }

    #[test]
    fn received_totals_count_only_completed_receipts() {
        let order = order(&[100, 40]);
        let (a, b) = (order.items[0].id, order.items[1].id);

        let completed = receipt_with_status(&order, vec![(a, 30), (b, 40)], GoodsReceiptStatus::Completed);
        let pending = receipt_with_status(&order, vec![(a, 20)], GoodsReceiptStatus::Pending);

        let totals = received_totals(&order, &[completed, pending]);
        assert_eq!(totals[&a], 30);
        assert_eq!(totals[&b], 40);
    }

    #[test]
    fn order_progress_tracks_partial_then_full_receipt() {
        let order = order(&[10, 5]);
        let (a, b) = (order.items[0].id, order.items[1].id);

        assert_eq!(order_progress(&order, &[]), None);

        let partial = receipt_with_status(&order, vec![(a, 10)], GoodsReceiptStatus::Completed);
        assert_eq!(
            order_progress(&order, std::slice::from_ref(&partial)),
            Some(PurchaseOrderStatus::PartiallyReceived)
        );

        let rest = receipt_with_status(&order, vec![(b, 5)], GoodsReceiptStatus::Completed);
        assert_eq!(
            order_progress(&order, &[partial, rest]),
            Some(PurchaseOrderStatus::Received)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: however receipts accumulate, accepted + in-flight never
        /// exceeds the ordered quantity when every receipt passed the gate.
        #[test]
        fn gated_receipts_never_oversubscribe_a_line(
            ordered in 1u32..200,
            requests in prop::collection::vec(1u32..60, 1..12),
            statuses in prop::collection::vec(0u8..3, 12),
        ) {
            let order = order(&[ordered]);
            let item = order.items[0].id;
            let mut receipts: Vec<GoodsReceipt> = Vec::new();

            for (request, status_pick) in requests.iter().zip(statuses.iter()) {
                let gate = ensure_receivable(&order, &receipts, &[(item, *request)], None);
                if gate.is_ok() {
                    let status = match status_pick {
                        0 => GoodsReceiptStatus::Pending,
                        1 => GoodsReceiptStatus::Completed,
                        _ => GoodsReceiptStatus::Rejected,
                    };
                    receipts.push(receipt_with_status(&order, vec![(item, *request)], status));
                }
            }

            let entry = availability(&order, &receipts, None)[&item];
            prop_assert!(entry.committed() <= ordered);
            prop_assert_eq!(entry.available(), ordered - entry.committed());
        }
    }
}
