//! Store traits.
//!
//! Commits that must be atomic are single trait methods: a goods-receipt
//! write lands together with its parent order's version bump, a payment
//! write lands together with its invoice's recomputed totals, and a ledger
//! batch lands with its aggregate upserts. Implementations guarantee the
//! all-or-nothing property (one write lock in memory, one transaction in
//! Postgres); callers guarantee they loaded fresh state and pass the version
//! they saw.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use procura_core::{
    ExpectedVersion, GoodsReceiptId, PurchaseInvoiceId, PurchaseOrderId, SupplierPaymentId,
    TenantId,
};
use procura_ledger::{StockKey, StockMovement, WarehouseStock};
use procura_procurement::{GoodsReceipt, PurchaseInvoice, PurchaseOrder, SupplierPayment};

/// Storage failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Stale version or uniqueness violation. Retryable: reload and re-gate.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A commit batch was internally inconsistent (mixed tenants, parent row
    /// missing). Indicates a caller bug, not a retryable race.
    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    /// Payload could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// The backend itself failed (connection, pool, poisoned lock).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for the purchase order → receipt → invoice → payment chain.
///
/// All reads are tenant-scoped; a record belonging to another tenant is
/// indistinguishable from a missing one.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    async fn insert_order(&self, order: PurchaseOrder) -> StoreResult<()>;

    async fn order(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>>;

    /// Replace an order. The store bumps the stored version by one; `expected`
    /// is checked against the version currently on disk.
    async fn update_order(
        &self,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;

    async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> StoreResult<Option<GoodsReceipt>>;

    async fn receipts_for_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Vec<GoodsReceipt>>;

    /// Insert a receipt and bump its parent order's version in one commit.
    /// Any concurrent receipt write against the same order conflicts.
    async fn insert_receipt(
        &self,
        receipt: GoodsReceipt,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;

    /// Replace a receipt and its parent order in one commit (the order's
    /// version is bumped, its fields may carry derived changes).
    async fn update_receipt(
        &self,
        receipt: GoodsReceipt,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;

    /// Insert an invoice. At most one invoice may exist per goods receipt;
    /// a second insert conflicts.
    async fn insert_invoice(&self, invoice: PurchaseInvoice) -> StoreResult<()>;

    async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> StoreResult<Option<PurchaseInvoice>>;

    async fn invoice_for_receipt(
        &self,
        tenant_id: TenantId,
        receipt_id: GoodsReceiptId,
    ) -> StoreResult<Option<PurchaseInvoice>>;

    async fn update_invoice(
        &self,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;

    async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> StoreResult<Option<SupplierPayment>>;

    async fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: PurchaseInvoiceId,
    ) -> StoreResult<Vec<SupplierPayment>>;

    /// Next unused payment sequence for a tenant + year (starts at 1).
    ///
    /// Read-latest-then-increment on its own is racy; the uniqueness of
    /// (tenant, year, seq) enforced by `insert_payment` is what closes the
    /// window, with callers retrying on conflict.
    async fn next_payment_seq(&self, tenant_id: TenantId, year: i32) -> StoreResult<u32>;

    /// Insert a payment and replace its invoice (recomputed paid state,
    /// version bumped) in one commit. Fails on a duplicate payment number.
    async fn insert_payment(
        &self,
        payment: SupplierPayment,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;

    /// Replace a payment and its invoice in one commit.
    async fn update_payment(
        &self,
        payment: SupplierPayment,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;
}

/// Persistence for the append-only stock movement log and its materialized
/// per-key counts.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append a movement batch and fold each quantity into its key's stock
    /// count, atomically. Returns the post-commit stock row for every touched
    /// key, in first-touch order.
    async fn append(
        &self,
        tenant_id: TenantId,
        movements: Vec<StockMovement>,
    ) -> StoreResult<Vec<WarehouseStock>>;

    async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Option<WarehouseStock>>;

    /// Movement history for one key, newest first.
    async fn movements_for_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Vec<StockMovement>>;
}

#[async_trait]
impl<S: ProcurementStore + ?Sized> ProcurementStore for Arc<S> {
    async fn insert_order(&self, order: PurchaseOrder) -> StoreResult<()> {
        self.as_ref().insert_order(order).await
    }

    async fn order(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>> {
        self.as_ref().order(tenant_id, id).await
    }

    async fn update_order(
        &self,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().update_order(order, expected).await
    }

    async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> StoreResult<Option<GoodsReceipt>> {
        self.as_ref().receipt(tenant_id, id).await
    }

    async fn receipts_for_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Vec<GoodsReceipt>> {
        self.as_ref().receipts_for_order(tenant_id, order_id).await
    }

    async fn insert_receipt(
        &self,
        receipt: GoodsReceipt,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().insert_receipt(receipt, order, expected).await
    }

    async fn update_receipt(
        &self,
        receipt: GoodsReceipt,
        order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().update_receipt(receipt, order, expected).await
    }

    async fn insert_invoice(&self, invoice: PurchaseInvoice) -> StoreResult<()> {
        self.as_ref().insert_invoice(invoice).await
    }

    async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        self.as_ref().invoice(tenant_id, id).await
    }

    async fn invoice_for_receipt(
        &self,
        tenant_id: TenantId,
        receipt_id: GoodsReceiptId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        self.as_ref().invoice_for_receipt(tenant_id, receipt_id).await
    }

    async fn update_invoice(
        &self,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().update_invoice(invoice, expected).await
    }

    async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> StoreResult<Option<SupplierPayment>> {
        self.as_ref().payment(tenant_id, id).await
    }

    async fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: PurchaseInvoiceId,
    ) -> StoreResult<Vec<SupplierPayment>> {
        self.as_ref().payments_for_invoice(tenant_id, invoice_id).await
    }

    async fn next_payment_seq(&self, tenant_id: TenantId, year: i32) -> StoreResult<u32> {
        self.as_ref().next_payment_seq(tenant_id, year).await
    }

    async fn insert_payment(
        &self,
        payment: SupplierPayment,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().insert_payment(payment, invoice, expected).await
    }

    async fn update_payment(
        &self,
        payment: SupplierPayment,
        invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        self.as_ref().update_payment(payment, invoice, expected).await
    }
}

#[async_trait]
impl<L: LedgerStore + ?Sized> LedgerStore for Arc<L> {
    async fn append(
        &self,
        tenant_id: TenantId,
        movements: Vec<StockMovement>,
    ) -> StoreResult<Vec<WarehouseStock>> {
        self.as_ref().append(tenant_id, movements).await
    }

    async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Option<WarehouseStock>> {
        self.as_ref().stock(tenant_id, key).await
    }

    async fn movements_for_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Vec<StockMovement>> {
        self.as_ref().movements_for_key(tenant_id, key).await
    }
}
