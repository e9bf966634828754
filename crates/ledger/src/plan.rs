//! Pure planners for physical stock operations.
//!
//! A planner validates the request and returns the movement drafts the store
//! must commit together. Planners never touch storage; callers read current
//! counts first and commit the returned batch atomically.

use procura_core::{DomainError, DomainResult, ProductId, VariantId, WarehouseId};

use crate::movement::{MovementDraft, MovementType, StockKey};

/// Outcome of planning a stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentPlan {
    /// Physical count equals the ledger count. Nothing to write.
    AlreadyMatches { stock_count: i64 },
    /// One ADJUSTMENT movement closing the gap.
    Movement { draft: MovementDraft, delta: i64 },
}

/// Plan an adjustment of one key toward a counted physical quantity.
///
/// `delta = physical_quantity - current`. A zero delta writes nothing and
/// reports the count already matches.
pub fn plan_adjustment(
    key: StockKey,
    current: i64,
    physical_quantity: i64,
    reason: &str,
) -> DomainResult<AdjustmentPlan> {
    if physical_quantity < 0 {
        return Err(DomainError::validation(format!(
            "physical_quantity must not be negative (got {physical_quantity})"
        )));
    }
    if reason.trim().is_empty() {
        return Err(DomainError::validation("reason must not be empty"));
    }

    let delta = physical_quantity - current;
    if delta == 0 {
        return Ok(AdjustmentPlan::AlreadyMatches {
            stock_count: current,
        });
    }

    Ok(AdjustmentPlan::Movement {
        draft: MovementDraft {
            key,
            movement_type: MovementType::Adjustment,
            quantity: delta,
            reference_type: Some("adjustment".to_string()),
            reference_id: None,
            notes: Some(reason.trim().to_string()),
        },
        delta,
    })
}

/// One line of a cross-warehouse transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Plan a multi-item transfer between two warehouses.
///
/// Produces one TRANSFER_OUT at the source and one TRANSFER_IN at the
/// destination per item, equal in magnitude. The returned batch must be
/// committed as a single atomic unit; a partially applied transfer leaves the
/// ledger unbalanced.
pub fn plan_transfer(
    source: WarehouseId,
    destination: WarehouseId,
    items: &[TransferItem],
    transfer_ref: &str,
    notes: Option<&str>,
) -> DomainResult<Vec<MovementDraft>> {
    if source == destination {
        return Err(DomainError::validation(
            "source and destination warehouse must differ",
        ));
    }
    if items.is_empty() {
        return Err(DomainError::validation(
            "transfer requires at least one item",
        ));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "transfer item {idx}: quantity must be positive (got {})",
                item.quantity
            )));
        }
    }

    let mut drafts = Vec::with_capacity(items.len() * 2);
    for item in items {
        let out_key = StockKey::new(source, item.product_id, item.variant_id);
        let in_key = StockKey::new(destination, item.product_id, item.variant_id);

        drafts.push(MovementDraft {
            key: out_key,
            movement_type: MovementType::TransferOut,
            quantity: -item.quantity,
            reference_type: Some("transfer".to_string()),
            reference_id: Some(transfer_ref.to_string()),
            notes: notes.map(str::to_string),
        });
        drafts.push(MovementDraft {
            key: in_key,
            movement_type: MovementType::TransferIn,
            quantity: item.quantity,
            reference_type: Some("transfer".to_string()),
            reference_id: Some(transfer_ref.to_string()),
            notes: notes.map(str::to_string),
        });
    }

    Ok(drafts)
}

/// Validate a directly recorded movement (order-driven or manually classified).
///
/// Quantity is already signed by the caller; zero writes are rejected because
/// they record nothing.
pub fn validate_movement(quantity: i64) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("movement quantity must not be zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> StockKey {
        StockKey::new(WarehouseId::new(), ProductId::new(), VariantId::new())
    }

    #[test]
    fn adjustment_closes_the_gap_upward() {
        let key = test_key();
        let plan = plan_adjustment(key, 18, 25, "cycle count").unwrap();

        match plan {
            AdjustmentPlan::Movement { draft, delta } => {
                assert_eq!(delta, 7);
                assert_eq!(draft.quantity, 7);
                assert_eq!(draft.movement_type, MovementType::Adjustment);
                assert_eq!(draft.key, key);
                assert_eq!(draft.notes.as_deref(), Some("cycle count"));
            }
            other => panic!("expected a movement, got {other:?}"),
        }
    }

    #[test]
    fn adjustment_closes_the_gap_downward() {
        let plan = plan_adjustment(test_key(), 30, 25, "shrinkage").unwrap();
        match plan {
            AdjustmentPlan::Movement { delta, draft } => {
                assert_eq!(delta, -5);
                assert_eq!(draft.quantity, -5);
            }
            other => panic!("expected a movement, got {other:?}"),
        }
    }

    #[test]
    fn matching_count_is_a_no_op() {
        let plan = plan_adjustment(test_key(), 25, 25, "cycle count").unwrap();
        assert_eq!(plan, AdjustmentPlan::AlreadyMatches { stock_count: 25 });
    }

    #[test]
    fn negative_physical_quantity_is_rejected() {
        let err = plan_adjustment(test_key(), 10, -1, "oops").unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("physical_quantity")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_reason_is_rejected() {
        let err = plan_adjustment(test_key(), 10, 12, "   ").unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("reason")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transfer_produces_balanced_pairs() {
        let source = WarehouseId::new();
        let destination = WarehouseId::new();
        let items = vec![
            TransferItem {
                product_id: ProductId::new(),
                variant_id: VariantId::new(),
                quantity: 10,
            },
            TransferItem {
                product_id: ProductId::new(),
                variant_id: VariantId::new(),
                quantity: 4,
            },
        ];

        let drafts = plan_transfer(source, destination, &items, "t-1", Some("restock")).unwrap();
        assert_eq!(drafts.len(), 4);

        for (item, pair) in items.iter().zip(drafts.chunks(2)) {
            let out = &pair[0];
            let inn = &pair[1];
            assert_eq!(out.movement_type, MovementType::TransferOut);
            assert_eq!(inn.movement_type, MovementType::TransferIn);
            assert_eq!(out.quantity, -item.quantity);
            assert_eq!(inn.quantity, item.quantity);
            assert_eq!(out.key.warehouse_id, source);
            assert_eq!(inn.key.warehouse_id, destination);
            assert_eq!(out.key.product_id, item.product_id);
            assert_eq!(inn.key.product_id, item.product_id);
            assert_eq!(out.quantity + inn.quantity, 0);
        }
    }

    #[test]
    fn transfer_to_same_warehouse_is_rejected() {
        let w = WarehouseId::new();
        let items = vec![TransferItem {
            product_id: ProductId::new(),
            variant_id: VariantId::new(),
            quantity: 1,
        }];
        assert!(plan_transfer(w, w, &items, "t-1", None).is_err());
    }

    #[test]
    fn empty_transfer_is_rejected() {
        let err =
            plan_transfer(WarehouseId::new(), WarehouseId::new(), &[], "t-1", None).unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("at least one item")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_positive_transfer_quantity_is_rejected() {
        let items = vec![TransferItem {
            product_id: ProductId::new(),
            variant_id: VariantId::new(),
            quantity: 0,
        }];
        let err = plan_transfer(WarehouseId::new(), WarehouseId::new(), &items, "t-1", None)
            .unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("item 0")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_quantity_movement_is_rejected() {
        assert!(validate_movement(0).is_err());
        assert!(validate_movement(-5).is_ok());
        assert!(validate_movement(5).is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: across any transfer batch, the signed quantities sum to
        /// zero per (product, variant), keeping the ledger balanced.
        #[test]
        fn transfer_batches_are_balanced(
            quantities in prop::collection::vec(1i64..10_000i64, 1..8)
        ) {
            let source = WarehouseId::new();
            let destination = WarehouseId::new();
            let items: Vec<TransferItem> = quantities
                .iter()
                .map(|&quantity| TransferItem {
                    product_id: ProductId::new(),
                    variant_id: VariantId::new(),
                    quantity,
                })
                .collect();

            let drafts = plan_transfer(source, destination, &items, "t-prop", None).unwrap();
            prop_assert_eq!(drafts.len(), items.len() * 2);

            for item in &items {
                let total: i64 = drafts
                    .iter()
                    .filter(|d| d.key.product_id == item.product_id
                        && d.key.variant_id == item.variant_id)
                    .map(|d| d.quantity)
                    .sum();
                prop_assert_eq!(total, 0);

                let out_total: i64 = drafts
                    .iter()
                    .filter(|d| d.key.warehouse_id == source
                        && d.key.product_id == item.product_id)
                    .map(|d| d.quantity)
                    .sum();
                prop_assert_eq!(out_total, -item.quantity);
            }
        }

        /// Property: adjusting to a physical count always lands exactly on the
        /// count, and planning again from there is a no-op.
        #[test]
        fn adjustment_is_exact_then_idempotent(
            current in -10_000i64..10_000i64,
            physical in 0i64..10_000i64,
        ) {
            let key = test_key();
            match plan_adjustment(key, current, physical, "count").unwrap() {
                AdjustmentPlan::AlreadyMatches { stock_count } => {
                    prop_assert_eq!(stock_count, current);
                    prop_assert_eq!(current, physical);
                }
                AdjustmentPlan::Movement { draft, delta } => {
                    prop_assert_eq!(current + delta, physical);
                    prop_assert_eq!(draft.quantity, delta);
                    let again = plan_adjustment(key, current + delta, physical, "count").unwrap();
                    prop_assert_eq!(
                        again,
                        AdjustmentPlan::AlreadyMatches { stock_count: physical }
                    );
                }
            }
        }
    }
}
