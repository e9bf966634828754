//! Procurement chain orchestration.
//!
//! Every write runs the same pipeline: load fresh state, gate it (transition
//! table, then quantity or amount bound), commit with the version that was
//! loaded. A version conflict means another writer landed in between; the
//! pipeline re-runs from the load step, re-gating against what actually
//! committed, up to [`ProcurementService::MAX_COMMIT_ATTEMPTS`] times.

use chrono::{Datelike, Utc};
use std::collections::BTreeMap;
use tracing::instrument;

use procura_core::{
    DomainError, ExpectedVersion, GoodsReceiptId, PurchaseInvoiceId, PurchaseOrderId,
    PurchaseOrderItemId, StatusMachine, SupplierId, SupplierPaymentId, TenantId, ensure_transition,
};
use procura_procurement::{
    GoodsReceipt, GoodsReceiptStatus, InvoiceStatus, InvoiceVariancePolicy, ItemAvailability,
    NewOrderItem, PaymentNumber, PaymentStatus, PurchaseInvoice, PurchaseOrder,
    PurchaseOrderStatus, SupplierPayment, financial, quantity,
};

use crate::error::ServiceError;
use crate::store::{ProcurementStore, StoreError};

/// A purchase order with its per-line receiving picture.
///
/// Received totals are derived from the order's receipts on every read, never
/// stored on the order itself.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: PurchaseOrder,
    pub availability: BTreeMap<PurchaseOrderItemId, ItemAvailability>,
}

/// Gate-then-commit service over the purchase order → receipt → invoice →
/// payment chain.
#[derive(Debug, Clone)]
pub struct ProcurementService<S> {
    store: S,
    variance: InvoiceVariancePolicy,
}

impl<S: ProcurementStore> ProcurementService<S> {
    /// How many times a pipeline re-runs after a version conflict before the
    /// conflict is surfaced to the caller.
    pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

    pub fn new(store: S, variance: InvoiceVariancePolicy) -> Self {
        Self { store, variance }
    }

    async fn load_order(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.store
            .order(tenant_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("purchase order {id} not found")))
    }

    async fn load_receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> Result<GoodsReceipt, ServiceError> {
        self.store
            .receipt(tenant_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("goods receipt {id} not found")))
    }

    async fn load_invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> Result<PurchaseInvoice, ServiceError> {
        self.store
            .invoice(tenant_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("invoice {id} not found")))
    }

    async fn load_payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> Result<SupplierPayment, ServiceError> {
        self.store
            .payment(tenant_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("payment {id} not found")))
    }

    #[instrument(skip(self, items), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn create_order(
        &self,
        tenant_id: TenantId,
        supplier_id: Option<SupplierId>,
        items: Vec<NewOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError> {
        let order = PurchaseOrder::new(tenant_id, supplier_id, items, Utc::now())?;
        self.store.insert_order(order.clone()).await?;
        Ok(order)
    }

    pub async fn order_detail(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self.load_order(tenant_id, id).await?;
        let receipts = self.store.receipts_for_order(tenant_id, order.id).await?;
        let availability = quantity::availability(&order, &receipts, None);
        Ok(OrderDetail {
            order,
            availability,
        })
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), order_id = %id.as_uuid(), requested = %requested),
        err
    )]
    pub async fn set_order_status(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
        requested: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut order = self.load_order(tenant_id, id).await?;
            ensure_transition(order.status, requested)?;

            order.status = requested;
            order.updated_at = Utc::now();
            let expected = ExpectedVersion::Exact(order.version);
            match self.store.update_order(order.clone(), expected).await {
                Ok(()) => {
                    order.version += 1;
                    return Ok(order);
                }
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Create a pending receipt against a receivable order.
    ///
    /// The order must be in approved, ordered or partially_received, and each
    /// requested line must fit the item's remaining availability.
    #[instrument(
        skip(self, lines, notes),
        fields(tenant_id = %tenant_id.as_uuid(), order_id = %purchase_order_id.as_uuid()),
        err
    )]
    pub async fn create_receipt(
        &self,
        tenant_id: TenantId,
        purchase_order_id: PurchaseOrderId,
        lines: Vec<(PurchaseOrderItemId, u32)>,
        notes: Option<String>,
    ) -> Result<GoodsReceipt, ServiceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let order = self.load_order(tenant_id, purchase_order_id).await?;
            if !order.status.accepts_receipts() {
                return Err(ServiceError::validation(format!(
                    "purchase order {} cannot receive goods in status {} \
                     (receiving requires approved, ordered or partially_received)",
                    order.id, order.status
                )));
            }

            let receipt = GoodsReceipt::new(
                tenant_id,
                order.id,
                lines.clone(),
                notes.clone(),
                Utc::now(),
            )?;

            let siblings = self.store.receipts_for_order(tenant_id, order.id).await?;
            let requested: Vec<(PurchaseOrderItemId, u32)> = receipt
                .items
                .iter()
                .map(|line| (line.purchase_order_item_id, line.quantity_received))
                .collect();
            quantity::ensure_receivable(&order, &siblings, &requested, None)?;

            let expected = ExpectedVersion::Exact(order.version);
            match self.store.insert_receipt(receipt.clone(), order, expected).await {
                Ok(()) => return Ok(receipt),
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> Result<GoodsReceipt, ServiceError> {
        self.load_receipt(tenant_id, id).await
    }

    /// Move a receipt through its table.
    ///
    /// Completion finalizes accepted quantities (defaulting to the received
    /// quantities, bounded by availability with this receipt excluded) and is
    /// the one event that rolls the parent order's receiving status forward.
    /// Every receipt transition commits against the parent order's version:
    /// each one changes what counts against availability.
    #[instrument(
        skip(self, accepted),
        fields(tenant_id = %tenant_id.as_uuid(), receipt_id = %id.as_uuid(), requested = %requested),
        err
    )]
    pub async fn set_receipt_status(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
        requested: GoodsReceiptStatus,
        accepted: Vec<(PurchaseOrderItemId, u32)>,
    ) -> Result<GoodsReceipt, ServiceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut receipt = self.load_receipt(tenant_id, id).await?;
            let mut order = self
                .load_order(tenant_id, receipt.purchase_order_id)
                .await?;
            ensure_transition(receipt.status, requested)?;

            let now = Utc::now();
            receipt.status = requested;
            receipt.updated_at = now;

            if requested == GoodsReceiptStatus::Completed {
                receipt.finalize_accepted(&accepted)?;

                let siblings = self.store.receipts_for_order(tenant_id, order.id).await?;
                let accepted_lines: Vec<(PurchaseOrderItemId, u32)> = receipt
                    .items
                    .iter()
                    .map(|line| (line.purchase_order_item_id, line.accepted_or_received()))
                    .collect();
                quantity::ensure_receivable(&order, &siblings, &accepted_lines, Some(receipt.id))?;

                // Roll the order forward from the post-completion receipt set,
                // only where its own table permits the move.
                let mut effective = siblings;
                if let Some(slot) = effective.iter_mut().find(|r| r.id == receipt.id) {
                    *slot = receipt.clone();
                }
                if let Some(next) = quantity::order_progress(&order, &effective) {
                    if next != order.status && order.status.can_transition(next) {
                        order.status = next;
                        order.updated_at = now;
                    }
                }
            }

            let expected = ExpectedVersion::Exact(order.version);
            match self.store.update_receipt(receipt.clone(), order, expected).await {
                Ok(()) => return Ok(receipt),
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Invoice a completed receipt.
    ///
    /// The receipt must be completed, must not be invoiced already, and the
    /// total must sit within the variance policy over the accepted amount.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), receipt_id = %goods_receipt_id.as_uuid()),
        err
    )]
    pub async fn create_invoice(
        &self,
        tenant_id: TenantId,
        goods_receipt_id: GoodsReceiptId,
        total_amount: u64,
    ) -> Result<PurchaseInvoice, ServiceError> {
        let receipt = self.load_receipt(tenant_id, goods_receipt_id).await?;
        if receipt.status != GoodsReceiptStatus::Completed {
            return Err(ServiceError::validation(format!(
                "goods receipt {} must be completed before invoicing (status: {})",
                receipt.id, receipt.status
            )));
        }
        if let Some(existing) = self
            .store
            .invoice_for_receipt(tenant_id, receipt.id)
            .await?
        {
            return Err(DomainError::conflict(format!(
                "goods receipt {} already has invoice {}",
                receipt.id, existing.id
            ))
            .into());
        }

        let order = self
            .load_order(tenant_id, receipt.purchase_order_id)
            .await?;
        let received_amount = receipt.accepted_amount(&order)?;
        self.variance.ensure_within(total_amount, received_amount)?;

        let invoice = PurchaseInvoice::new(tenant_id, receipt.id, total_amount, Utc::now())?;
        self.store.insert_invoice(invoice.clone()).await?;
        Ok(invoice)
    }

    pub async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> Result<PurchaseInvoice, ServiceError> {
        self.load_invoice(tenant_id, id).await
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), invoice_id = %id.as_uuid(), requested = %requested),
        err
    )]
    pub async fn set_invoice_status(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
        requested: InvoiceStatus,
    ) -> Result<PurchaseInvoice, ServiceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut invoice = self.load_invoice(tenant_id, id).await?;
            ensure_transition(invoice.status, requested)?;

            invoice.status = requested;
            invoice.updated_at = Utc::now();
            let expected = ExpectedVersion::Exact(invoice.version);
            match self.store.update_invoice(invoice.clone(), expected).await {
                Ok(()) => {
                    invoice.version += 1;
                    return Ok(invoice);
                }
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Record a pending payment against an invoice.
    ///
    /// The amount is bounded by the balance remaining after completed
    /// payments; the payment number is allocated from the tenant + year
    /// sequence. A lost allocation race conflicts on commit and re-runs with
    /// a fresh number.
    #[instrument(
        skip(self, payment_method),
        fields(tenant_id = %tenant_id.as_uuid(), invoice_id = %purchase_invoice_id.as_uuid()),
        err
    )]
    pub async fn create_payment(
        &self,
        tenant_id: TenantId,
        purchase_invoice_id: PurchaseInvoiceId,
        supplier_id: Option<SupplierId>,
        amount: u64,
        payment_method: String,
    ) -> Result<SupplierPayment, ServiceError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let invoice = self.load_invoice(tenant_id, purchase_invoice_id).await?;
            let payments = self
                .store
                .payments_for_invoice(tenant_id, invoice.id)
                .await?;
            let paid = financial::paid_total(&payments);
            financial::ensure_new_payment(&invoice, paid, amount)?;

            let now = Utc::now();
            let year = now.year();
            let seq = self.store.next_payment_seq(tenant_id, year).await?;
            let payment = SupplierPayment::new(
                tenant_id,
                invoice.id,
                supplier_id,
                PaymentNumber::new(year, seq),
                amount,
                payment_method.clone(),
                now,
            )?;

            // A pending payment leaves the paid total alone; the invoice is
            // committed untouched so the balance check serializes on its
            // version.
            let expected = ExpectedVersion::Exact(invoice.version);
            match self.store.insert_payment(payment.clone(), invoice, expected).await {
                Ok(()) => return Ok(payment),
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> Result<SupplierPayment, ServiceError> {
        self.load_payment(tenant_id, id).await
    }

    /// Update a payment's amount and/or status, then recompute the invoice.
    ///
    /// An amount change is bounded against the balance with this payment
    /// excluded. A status change follows the payment table; an admin may take
    /// pending straight to completed. Afterwards the invoice's paid amount is
    /// recomputed from the effective completed set and its status re-derived
    /// (cancelled stays cancelled).
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), payment_id = %id.as_uuid(), admin),
        err
    )]
    pub async fn update_payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
        new_amount: Option<u64>,
        new_status: Option<PaymentStatus>,
        admin: bool,
    ) -> Result<SupplierPayment, ServiceError> {
        if new_amount.is_none() && new_status.is_none() {
            return Err(ServiceError::validation(
                "payment update requires an amount or a status",
            ));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut payment = self.load_payment(tenant_id, id).await?;
            let mut invoice = self
                .load_invoice(tenant_id, payment.purchase_invoice_id)
                .await?;
            let payments = self
                .store
                .payments_for_invoice(tenant_id, invoice.id)
                .await?;

            if let Some(amount) = new_amount {
                if amount != payment.amount {
                    let paid_excluding = financial::paid_total_excluding(&payments, payment.id);
                    financial::ensure_updated_amount(&invoice, paid_excluding, amount)?;
                    payment.amount = amount;
                }
            }

            if let Some(status) = new_status {
                if status != payment.status {
                    if !(admin && PaymentStatus::admin_bypass_allows(payment.status, status)) {
                        ensure_transition(payment.status, status)?;
                    }
                    payment.status = status;
                }
            }

            let now = Utc::now();
            payment.updated_at = now;

            let mut effective = payments;
            if let Some(slot) = effective.iter_mut().find(|p| p.id == payment.id) {
                *slot = payment.clone();
            }
            let paid = financial::paid_total(&effective);
            invoice.paid_amount = paid;
            invoice.status = financial::derive_status(invoice.status, paid, invoice.total_amount);
            invoice.updated_at = now;

            let expected = ExpectedVersion::Exact(invoice.version);
            match self.store.update_payment(payment.clone(), invoice, expected).await {
                Ok(()) => return Ok(payment),
                Err(StoreError::Conflict(_)) if attempts < Self::MAX_COMMIT_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
