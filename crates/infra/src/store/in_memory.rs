//! In-memory stores.
//!
//! Intended for tests/dev. A single `RwLock` over each store's tables makes
//! every commit method atomic: all checks and writes happen under one write
//! guard, so a multi-record commit is observed entirely or not at all.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use procura_core::{
    ExpectedVersion, GoodsReceiptId, PurchaseInvoiceId, PurchaseOrderId, SupplierPaymentId,
    TenantId,
};
use procura_ledger::{StockKey, StockMovement, WarehouseStock};
use procura_procurement::{GoodsReceipt, PurchaseInvoice, PurchaseOrder, SupplierPayment};

use super::traits::{LedgerStore, ProcurementStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct ProcurementTables {
    orders: HashMap<(TenantId, PurchaseOrderId), PurchaseOrder>,
    receipts: HashMap<(TenantId, GoodsReceiptId), GoodsReceipt>,
    invoices: HashMap<(TenantId, PurchaseInvoiceId), PurchaseInvoice>,
    payments: HashMap<(TenantId, SupplierPaymentId), SupplierPayment>,
}

/// In-memory procurement chain store.
#[derive(Debug, Default)]
pub struct InMemoryProcurementStore {
    tables: RwLock<ProcurementTables>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, ProcurementTables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, ProcurementTables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn check_order_version(
    tables: &ProcurementTables,
    tenant_id: TenantId,
    order_id: PurchaseOrderId,
    expected: ExpectedVersion,
) -> StoreResult<u64> {
    let current = tables
        .orders
        .get(&(tenant_id, order_id))
        .map(|order| order.version)
        .ok_or_else(|| {
            StoreError::InvalidCommit(format!("purchase order {order_id} missing during commit"))
        })?;

    if !expected.matches(current) {
        return Err(StoreError::Conflict(format!(
            "purchase order {order_id}: expected {expected:?}, found {current}"
        )));
    }
    Ok(current)
}

fn check_invoice_version(
    tables: &ProcurementTables,
    tenant_id: TenantId,
    invoice_id: PurchaseInvoiceId,
    expected: ExpectedVersion,
) -> StoreResult<u64> {
    let current = tables
        .invoices
        .get(&(tenant_id, invoice_id))
        .map(|invoice| invoice.version)
        .ok_or_else(|| {
            StoreError::InvalidCommit(format!("invoice {invoice_id} missing during commit"))
        })?;

    if !expected.matches(current) {
        return Err(StoreError::Conflict(format!(
            "invoice {invoice_id}: expected {expected:?}, found {current}"
        )));
    }
    Ok(current)
}

#[async_trait]
impl ProcurementStore for InMemoryProcurementStore {
    async fn insert_order(&self, order: PurchaseOrder) -> StoreResult<()> {
        let mut tables = self.write()?;
        let key = (order.tenant_id, order.id);
        if tables.orders.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "purchase order {} already exists",
                order.id
            )));
        }
        tables.orders.insert(key, order);
        Ok(())
    }

    async fn order(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.read()?.orders.get(&(tenant_id, id)).cloned())
    }

    async fn update_order(
        &self,
        mut order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let mut tables = self.write()?;
        let current = check_order_version(&tables, order.tenant_id, order.id, expected)?;
        order.version = current + 1;
        tables.orders.insert((order.tenant_id, order.id), order);
        Ok(())
    }

    async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> StoreResult<Option<GoodsReceipt>> {
        Ok(self.read()?.receipts.get(&(tenant_id, id)).cloned())
    }

    async fn receipts_for_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Vec<GoodsReceipt>> {
        let tables = self.read()?;
        let mut receipts: Vec<GoodsReceipt> = tables
            .receipts
            .values()
            .filter(|receipt| {
                receipt.tenant_id == tenant_id && receipt.purchase_order_id == order_id
            })
            .cloned()
            .collect();
        receipts.sort_by_key(|receipt| receipt.id);
        Ok(receipts)
    }

    async fn insert_receipt(
        &self,
        receipt: GoodsReceipt,
        mut order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        if receipt.tenant_id != order.tenant_id || receipt.purchase_order_id != order.id {
            return Err(StoreError::InvalidCommit(
                "receipt and order do not belong together".to_string(),
            ));
        }

        let mut tables = self.write()?;
        let current = check_order_version(&tables, order.tenant_id, order.id, expected)?;

        let receipt_key = (receipt.tenant_id, receipt.id);
        if tables.receipts.contains_key(&receipt_key) {
            return Err(StoreError::Conflict(format!(
                "goods receipt {} already exists",
                receipt.id
            )));
        }

        order.version = current + 1;
        tables.orders.insert((order.tenant_id, order.id), order);
        tables.receipts.insert(receipt_key, receipt);
        Ok(())
    }

    async fn update_receipt(
        &self,
        receipt: GoodsReceipt,
        mut order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        if receipt.tenant_id != order.tenant_id || receipt.purchase_order_id != order.id {
            return Err(StoreError::InvalidCommit(
                "receipt and order do not belong together".to_string(),
            ));
        }

        let mut tables = self.write()?;
        let current = check_order_version(&tables, order.tenant_id, order.id, expected)?;

        let receipt_key = (receipt.tenant_id, receipt.id);
        if !tables.receipts.contains_key(&receipt_key) {
            return Err(StoreError::InvalidCommit(format!(
                "goods receipt {} missing during commit",
                receipt.id
            )));
        }

        order.version = current + 1;
        tables.orders.insert((order.tenant_id, order.id), order);
        tables.receipts.insert(receipt_key, receipt);
        Ok(())
    }

    async fn insert_invoice(&self, invoice: PurchaseInvoice) -> StoreResult<()> {
        let mut tables = self.write()?;

        if let Some(existing) = tables.invoices.values().find(|other| {
            other.tenant_id == invoice.tenant_id
                && other.goods_receipt_id == invoice.goods_receipt_id
        }) {
            return Err(StoreError::Conflict(format!(
                "goods receipt {} already has invoice {}",
                invoice.goods_receipt_id, existing.id
            )));
        }

        tables
            .invoices
            .insert((invoice.tenant_id, invoice.id), invoice);
        Ok(())
    }

    async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        Ok(self.read()?.invoices.get(&(tenant_id, id)).cloned())
    }

    async fn invoice_for_receipt(
        &self,
        tenant_id: TenantId,
        receipt_id: GoodsReceiptId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .find(|invoice| {
                invoice.tenant_id == tenant_id && invoice.goods_receipt_id == receipt_id
            })
            .cloned())
    }

    async fn update_invoice(
        &self,
        mut invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let mut tables = self.write()?;
        let current = check_invoice_version(&tables, invoice.tenant_id, invoice.id, expected)?;
        invoice.version = current + 1;
        tables
            .invoices
            .insert((invoice.tenant_id, invoice.id), invoice);
        Ok(())
    }

    async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> StoreResult<Option<SupplierPayment>> {
        Ok(self.read()?.payments.get(&(tenant_id, id)).cloned())
    }

    async fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: PurchaseInvoiceId,
    ) -> StoreResult<Vec<SupplierPayment>> {
        let tables = self.read()?;
        let mut payments: Vec<SupplierPayment> = tables
            .payments
            .values()
            .filter(|payment| {
                payment.tenant_id == tenant_id && payment.purchase_invoice_id == invoice_id
            })
            .cloned()
            .collect();
        payments.sort_by_key(|payment| payment.id);
        Ok(payments)
    }

    async fn next_payment_seq(&self, tenant_id: TenantId, year: i32) -> StoreResult<u32> {
        let tables = self.read()?;
        let highest = tables
            .payments
            .values()
            .filter(|payment| {
                payment.tenant_id == tenant_id && payment.payment_number.year() == year
            })
            .map(|payment| payment.payment_number.seq())
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn insert_payment(
        &self,
        payment: SupplierPayment,
        mut invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        if payment.tenant_id != invoice.tenant_id || payment.purchase_invoice_id != invoice.id {
            return Err(StoreError::InvalidCommit(
                "payment and invoice do not belong together".to_string(),
            ));
        }

        let mut tables = self.write()?;
        let current = check_invoice_version(&tables, invoice.tenant_id, invoice.id, expected)?;

        // (tenant, year, seq) uniqueness closes the duplicate-number race.
        if tables.payments.values().any(|other| {
            other.tenant_id == payment.tenant_id
                && other.payment_number == payment.payment_number
        }) {
            return Err(StoreError::Conflict(format!(
                "payment number {} already allocated",
                payment.payment_number
            )));
        }

        invoice.version = current + 1;
        tables
            .invoices
            .insert((invoice.tenant_id, invoice.id), invoice);
        tables
            .payments
            .insert((payment.tenant_id, payment.id), payment);
        Ok(())
    }

    async fn update_payment(
        &self,
        payment: SupplierPayment,
        mut invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        if payment.tenant_id != invoice.tenant_id || payment.purchase_invoice_id != invoice.id {
            return Err(StoreError::InvalidCommit(
                "payment and invoice do not belong together".to_string(),
            ));
        }

        let mut tables = self.write()?;
        let current = check_invoice_version(&tables, invoice.tenant_id, invoice.id, expected)?;

        let payment_key = (payment.tenant_id, payment.id);
        if !tables.payments.contains_key(&payment_key) {
            return Err(StoreError::InvalidCommit(format!(
                "payment {} missing during commit",
                payment.id
            )));
        }

        invoice.version = current + 1;
        tables
            .invoices
            .insert((invoice.tenant_id, invoice.id), invoice);
        tables.payments.insert(payment_key, payment);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LedgerTables {
    /// Append-only movement log, one vector per tenant in commit order.
    movements: HashMap<TenantId, Vec<StockMovement>>,
    stocks: HashMap<(TenantId, StockKey), WarehouseStock>,
}

/// In-memory stock ledger store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<LedgerTables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, LedgerTables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, LedgerTables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(
        &self,
        tenant_id: TenantId,
        movements: Vec<StockMovement>,
    ) -> StoreResult<Vec<WarehouseStock>> {
        if movements.is_empty() {
            return Ok(vec![]);
        }
        for (idx, movement) in movements.iter().enumerate() {
            if movement.tenant_id != tenant_id {
                return Err(StoreError::InvalidCommit(format!(
                    "batch contains foreign tenant_id (index {idx})"
                )));
            }
        }

        let mut tables = self.write()?;
        let mut touched: Vec<StockKey> = Vec::new();

        for movement in movements {
            let key = movement.key();
            let entry = tables
                .stocks
                .entry((tenant_id, key))
                .or_insert_with(|| WarehouseStock {
                    warehouse_id: key.warehouse_id,
                    product_id: key.product_id,
                    variant_id: key.variant_id,
                    stock_count: 0,
                    updated_at: movement.created_at,
                });
            entry.stock_count += movement.quantity;
            entry.updated_at = movement.created_at;

            if !touched.contains(&key) {
                touched.push(key);
            }
            tables.movements.entry(tenant_id).or_default().push(movement);
        }

        let stocks = touched
            .into_iter()
            .filter_map(|key| tables.stocks.get(&(tenant_id, key)).cloned())
            .collect();
        Ok(stocks)
    }

    async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Option<WarehouseStock>> {
        Ok(self.read()?.stocks.get(&(tenant_id, *key)).cloned())
    }

    async fn movements_for_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Vec<StockMovement>> {
        let tables = self.read()?;
        let movements = tables
            .movements
            .get(&tenant_id)
            .map(|log| {
                log.iter()
                    .filter(|movement| movement.key() == *key)
                    .rev()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(movements)
    }
}
