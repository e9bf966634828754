//! Purchase invoices and the invoice variance policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{DomainError, DomainResult, GoodsReceiptId, PurchaseInvoiceId, TenantId};

use crate::status::InvoiceStatus;

/// Supplier's bill for a completed goods receipt.
///
/// `paid_amount` is a derived value: it must always equal the sum of the
/// invoice's completed payments and is recomputed (never incremented) on
/// every payment write. `version` backs the optimistic concurrency check
/// that serializes payment application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseInvoice {
    pub id: PurchaseInvoiceId,
    pub tenant_id: TenantId,
    pub goods_receipt_id: GoodsReceiptId,
    /// Amount billed, in smallest currency unit (e.g. cents).
    pub total_amount: u64,
    /// Sum of completed payments, in smallest currency unit.
    pub paid_amount: u64,
    pub status: InvoiceStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseInvoice {
    pub fn new(
        tenant_id: TenantId,
        goods_receipt_id: GoodsReceiptId,
        total_amount: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if total_amount == 0 {
            return Err(DomainError::validation("total_amount must be positive"));
        }

        Ok(Self {
            id: PurchaseInvoiceId::new(),
            tenant_id,
            goods_receipt_id,
            total_amount,
            paid_amount: 0,
            status: InvoiceStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Remaining balance (never underflows).
    pub fn outstanding_amount(&self) -> u64 {
        self.total_amount.saturating_sub(self.paid_amount)
    }
}

/// Named tolerance for how far an invoice total may exceed the value of the
/// goods actually received.
///
/// Suppliers bill tax, freight and rounding on top of line values, so a flat
/// equality check is too strict. The allowed headroom is a percentage over
/// the receipt's accepted amount, 20% unless configured otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVariancePolicy {
    pub percent: u16,
}

impl Default for InvoiceVariancePolicy {
    fn default() -> Self {
        Self { percent: 20 }
    }
}

impl InvoiceVariancePolicy {
    pub fn new(percent: u16) -> Self {
        Self { percent }
    }

    /// Highest invoice total this policy accepts for a given received amount.
    pub fn max_invoiceable(&self, received_amount: u64) -> u64 {
        // u128 keeps the multiply exact for any u64 amount.
        let allowed = u128::from(received_amount) * (100 + u128::from(self.percent)) / 100;
        u64::try_from(allowed).unwrap_or(u64::MAX)
    }

    /// Gate an invoice total against the received amount.
    pub fn ensure_within(&self, total_amount: u64, received_amount: u64) -> DomainResult<()> {
        let max = self.max_invoiceable(received_amount);
        if total_amount > max {
            return Err(DomainError::validation(format!(
                "invoice total {total_amount} exceeds allowed variance: received amount \
                 {received_amount} + {}% allows at most {max}",
                self.percent
            )));
        }
        Ok(())
    }
}
