//! Postgres-backed stores.
//!
//! Rows keep the full entity as a JSONB payload next to typed columns for
//! keys and constraint targets: identity, parent references, the optimistic
//! version, and the payment number parts. Multi-record commits run in one
//! transaction with the parent row locked (`SELECT ... FOR UPDATE`), so
//! version checks cannot race the write.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key / check violation) | `23503`, `23514` | `InvalidCommit` |
//! | Database (other), PoolClosed, network | any | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use async_trait::async_trait;

use procura_core::{
    ExpectedVersion, GoodsReceiptId, PurchaseInvoiceId, PurchaseOrderId, SupplierPaymentId,
    TenantId,
};
use procura_ledger::{StockKey, StockMovement, WarehouseStock};
use procura_procurement::{GoodsReceipt, PurchaseInvoice, PurchaseOrder, SupplierPayment};

use super::traits::{LedgerStore, ProcurementStore, StoreError, StoreResult};

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::InvalidCommit(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::Serialization(format!("encode {what}: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(what: &str, value: serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::Serialization(format!("decode {what}: {e}")))
}

struct VersionedRow {
    version: i64,
    payload: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for VersionedRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(VersionedRow {
            version: row.try_get("version")?,
            payload: row.try_get("payload")?,
        })
    }
}

struct PayloadRow {
    payload: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for PayloadRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(PayloadRow {
            payload: row.try_get("payload")?,
        })
    }
}

struct StockRow {
    stock_count: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StockRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            stock_count: row.try_get("stock_count")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Lock an order row and return its stored version.
async fn fetch_order_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    order_id: PurchaseOrderId,
) -> StoreResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT version FROM purchase_orders
        WHERE tenant_id = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(*tenant_id.as_uuid())
    .bind(*order_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("fetch_order_version", e))?;

    match row {
        Some(row) => row
            .try_get("version")
            .map_err(|e| map_sqlx_error("fetch_order_version", e)),
        None => Err(StoreError::InvalidCommit(format!(
            "purchase order {order_id} missing during commit"
        ))),
    }
}

/// Lock an invoice row and return its stored version.
async fn fetch_invoice_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    invoice_id: PurchaseInvoiceId,
) -> StoreResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT version FROM purchase_invoices
        WHERE tenant_id = $1 AND id = $2
        FOR UPDATE
        "#,
    )
    .bind(*tenant_id.as_uuid())
    .bind(*invoice_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("fetch_invoice_version", e))?;

    match row {
        Some(row) => row
            .try_get("version")
            .map_err(|e| map_sqlx_error("fetch_invoice_version", e)),
        None => Err(StoreError::InvalidCommit(format!(
            "invoice {invoice_id} missing during commit"
        ))),
    }
}

async fn write_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrder,
) -> StoreResult<()> {
    let payload = encode("purchase order", order)?;
    sqlx::query(
        r#"
        UPDATE purchase_orders SET version = $3, payload = $4
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(*order.tenant_id.as_uuid())
    .bind(*order.id.as_uuid())
    .bind(order.version as i64)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_order", e))?;
    Ok(())
}

async fn write_invoice(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &PurchaseInvoice,
) -> StoreResult<()> {
    let payload = encode("invoice", invoice)?;
    sqlx::query(
        r#"
        UPDATE purchase_invoices SET version = $3, payload = $4
        WHERE tenant_id = $1 AND id = $2
        "#,
    )
    .bind(*invoice.tenant_id.as_uuid())
    .bind(*invoice.id.as_uuid())
    .bind(invoice.version as i64)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_invoice", e))?;
    Ok(())
}

/// Postgres procurement chain store.
///
/// Every query includes `tenant_id` in the WHERE clause; a row from another
/// tenant is unreachable.
#[derive(Debug, Clone)]
pub struct PostgresProcurementStore {
    pool: Arc<PgPool>,
}

impl PostgresProcurementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ProcurementStore for PostgresProcurementStore {
    #[instrument(
        skip(self, order),
        fields(tenant_id = %order.tenant_id.as_uuid(), order_id = %order.id.as_uuid()),
        err
    )]
    async fn insert_order(&self, order: PurchaseOrder) -> StoreResult<()> {
        let payload = encode("purchase order", &order)?;
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (tenant_id, id, version, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*order.tenant_id.as_uuid())
        .bind(*order.id.as_uuid())
        .bind(order.version as i64)
        .bind(payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), order_id = %id.as_uuid()), err)]
    async fn order(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>> {
        let row: Option<VersionedRow> = sqlx::query_as(
            r#"
            SELECT version, payload FROM purchase_orders
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order", e))?;

        row.map(|row| {
            let mut order: PurchaseOrder = decode("purchase order", row.payload)?;
            // The typed column is authoritative.
            order.version = row.version as u64;
            Ok(order)
        })
        .transpose()
    }

    #[instrument(
        skip(self, order),
        fields(tenant_id = %order.tenant_id.as_uuid(), order_id = %order.id.as_uuid()),
        err
    )]
    async fn update_order(
        &self,
        mut order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_order_version(&mut tx, order.tenant_id, order.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "purchase order {}: expected {expected:?}, found {current}",
                order.id
            )));
        }

        order.version = (current + 1) as u64;
        write_order(&mut tx, &order).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), receipt_id = %id.as_uuid()), err)]
    async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> StoreResult<Option<GoodsReceipt>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM goods_receipts
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("receipt", e))?;

        row.map(|row| decode("goods receipt", row.payload)).transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), order_id = %order_id.as_uuid()),
        err
    )]
    async fn receipts_for_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Vec<GoodsReceipt>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM goods_receipts
            WHERE tenant_id = $1 AND purchase_order_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("receipts_for_order", e))?;

        rows.into_iter()
            .map(|row| decode("goods receipt", row.payload))
            .collect()
    }

    #[instrument(
        skip(self, receipt, order),
        fields(
            tenant_id = %receipt.tenant_id.as_uuid(),
            receipt_id = %receipt.id.as_uuid(),
            order_id = %order.id.as_uuid()
        ),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_order_version(&mut tx, order.tenant_id, order.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "purchase order {}: expected {expected:?}, found {current}",
                order.id
            )));
        }

        order.version = (current + 1) as u64;
        write_order(&mut tx, &order).await?;

        let payload = encode("goods receipt", &receipt)?;
        sqlx::query(
            r#"
            INSERT INTO goods_receipts (tenant_id, id, purchase_order_id, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*receipt.tenant_id.as_uuid())
        .bind(*receipt.id.as_uuid())
        .bind(*receipt.purchase_order_id.as_uuid())
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_receipt", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, receipt, order),
        fields(
            tenant_id = %receipt.tenant_id.as_uuid(),
            receipt_id = %receipt.id.as_uuid(),
            order_id = %order.id.as_uuid()
        ),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_order_version(&mut tx, order.tenant_id, order.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "purchase order {}: expected {expected:?}, found {current}",
                order.id
            )));
        }

        order.version = (current + 1) as u64;
        write_order(&mut tx, &order).await?;

        let payload = encode("goods receipt", &receipt)?;
        let result = sqlx::query(
            r#"
            UPDATE goods_receipts SET payload = $3
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*receipt.tenant_id.as_uuid())
        .bind(*receipt.id.as_uuid())
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_receipt", e))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::InvalidCommit(format!(
                "goods receipt {} missing during commit",
                receipt.id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, invoice),
        fields(
            tenant_id = %invoice.tenant_id.as_uuid(),
            invoice_id = %invoice.id.as_uuid(),
            receipt_id = %invoice.goods_receipt_id.as_uuid()
        ),
        err
    )]
    async fn insert_invoice(&self, invoice: PurchaseInvoice) -> StoreResult<()> {
        let payload = encode("invoice", &invoice)?;
        sqlx::query(
            r#"
            INSERT INTO purchase_invoices (tenant_id, id, goods_receipt_id, version, payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*invoice.tenant_id.as_uuid())
        .bind(*invoice.id.as_uuid())
        .bind(*invoice.goods_receipt_id.as_uuid())
        .bind(invoice.version as i64)
        .bind(payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            // Unique (tenant_id, goods_receipt_id): one invoice per receipt.
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "goods receipt {} already has an invoice",
                    invoice.goods_receipt_id
                ))
            } else {
                map_sqlx_error("insert_invoice", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), invoice_id = %id.as_uuid()), err)]
    async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        let row: Option<VersionedRow> = sqlx::query_as(
            r#"
            SELECT version, payload FROM purchase_invoices
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoice", e))?;

        row.map(|row| {
            let mut invoice: PurchaseInvoice = decode("invoice", row.payload)?;
            invoice.version = row.version as u64;
            Ok(invoice)
        })
        .transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), receipt_id = %receipt_id.as_uuid()),
        err
    )]
    async fn invoice_for_receipt(
        &self,
        tenant_id: TenantId,
        receipt_id: GoodsReceiptId,
    ) -> StoreResult<Option<PurchaseInvoice>> {
        let row: Option<VersionedRow> = sqlx::query_as(
            r#"
            SELECT version, payload FROM purchase_invoices
            WHERE tenant_id = $1 AND goods_receipt_id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*receipt_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("invoice_for_receipt", e))?;

        row.map(|row| {
            let mut invoice: PurchaseInvoice = decode("invoice", row.payload)?;
            invoice.version = row.version as u64;
            Ok(invoice)
        })
        .transpose()
    }

    #[instrument(
        skip(self, invoice),
        fields(tenant_id = %invoice.tenant_id.as_uuid(), invoice_id = %invoice.id.as_uuid()),
        err
    )]
    async fn update_invoice(
        &self,
        mut invoice: PurchaseInvoice,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_invoice_version(&mut tx, invoice.tenant_id, invoice.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "invoice {}: expected {expected:?}, found {current}",
                invoice.id
            )));
        }

        invoice.version = (current + 1) as u64;
        write_invoice(&mut tx, &invoice).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), payment_id = %id.as_uuid()), err)]
    async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> StoreResult<Option<SupplierPayment>> {
        let row: Option<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM supplier_payments
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("payment", e))?;

        row.map(|row| decode("payment", row.payload)).transpose()
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), invoice_id = %invoice_id.as_uuid()),
        err
    )]
    async fn payments_for_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: PurchaseInvoiceId,
    ) -> StoreResult<Vec<SupplierPayment>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM supplier_payments
            WHERE tenant_id = $1 AND purchase_invoice_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*invoice_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("payments_for_invoice", e))?;

        rows.into_iter()
            .map(|row| decode("payment", row.payload))
            .collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), year), err)]
    async fn next_payment_seq(&self, tenant_id: TenantId, year: i32) -> StoreResult<u32> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(payment_seq), 0) AS last_seq
            FROM supplier_payments
            WHERE tenant_id = $1 AND payment_year = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(year)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_payment_seq", e))?;

        let last_seq: i64 = row
            .try_get("last_seq")
            .map_err(|e| map_sqlx_error("next_payment_seq", e))?;
        Ok(last_seq as u32 + 1)
    }

    #[instrument(
        skip(self, payment, invoice),
        fields(
            tenant_id = %payment.tenant_id.as_uuid(),
            payment_id = %payment.id.as_uuid(),
            invoice_id = %invoice.id.as_uuid()
        ),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_invoice_version(&mut tx, invoice.tenant_id, invoice.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "invoice {}: expected {expected:?}, found {current}",
                invoice.id
            )));
        }

        invoice.version = (current + 1) as u64;
        write_invoice(&mut tx, &invoice).await?;

        let payload = encode("payment", &payment)?;
        sqlx::query(
            r#"
            INSERT INTO supplier_payments
                (tenant_id, id, purchase_invoice_id, payment_year, payment_seq, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*payment.tenant_id.as_uuid())
        .bind(*payment.id.as_uuid())
        .bind(*payment.purchase_invoice_id.as_uuid())
        .bind(payment.payment_number.year())
        .bind(i64::from(payment.payment_number.seq()))
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // Unique (tenant_id, payment_year, payment_seq): a concurrent
            // allocation of the same number loses here and retries.
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "payment number {} already allocated",
                    payment.payment_number
                ))
            } else {
                map_sqlx_error("insert_payment", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, payment, invoice),
        fields(
            tenant_id = %payment.tenant_id.as_uuid(),
            payment_id = %payment.id.as_uuid(),
            invoice_id = %invoice.id.as_uuid()
        ),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = fetch_invoice_version(&mut tx, invoice.tenant_id, invoice.id).await?;
        if !expected.matches(current as u64) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "invoice {}: expected {expected:?}, found {current}",
                invoice.id
            )));
        }

        invoice.version = (current + 1) as u64;
        write_invoice(&mut tx, &invoice).await?;

        let payload = encode("payment", &payment)?;
        let result = sqlx::query(
            r#"
            UPDATE supplier_payments SET payload = $3
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(*payment.tenant_id.as_uuid())
        .bind(*payment.id.as_uuid())
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_payment", e))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::InvalidCommit(format!(
                "payment {} missing during commit",
                payment.id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

/// Postgres stock ledger store.
///
/// Movements are append-only; `warehouse_inventory` is upserted in the same
/// transaction, so the materialized counts cannot drift from the log.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(
        skip(self, movements),
        fields(tenant_id = %tenant_id.as_uuid(), batch_len = movements.len()),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut touched: Vec<StockKey> = Vec::new();
        let mut latest: HashMap<StockKey, WarehouseStock> = HashMap::new();

        for movement in movements {
            let payload = encode("stock movement", &movement)?;
            sqlx::query(
                r#"
                INSERT INTO stock_movements
                    (tenant_id, id, warehouse_id, product_id, variant_id, created_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(*movement.tenant_id.as_uuid())
            .bind(*movement.id.as_uuid())
            .bind(*movement.warehouse_id.as_uuid())
            .bind(*movement.product_id.as_uuid())
            .bind(*movement.variant_id.as_uuid())
            .bind(movement.created_at)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_movement", e))?;

            let key = movement.key();
            let row: StockRow = sqlx::query_as(
                r#"
                INSERT INTO warehouse_inventory
                    (tenant_id, warehouse_id, product_id, variant_id, stock_count, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (tenant_id, warehouse_id, product_id, variant_id)
                DO UPDATE SET
                    stock_count = warehouse_inventory.stock_count + EXCLUDED.stock_count,
                    updated_at = EXCLUDED.updated_at
                RETURNING stock_count, updated_at
                "#,
            )
            .bind(*tenant_id.as_uuid())
            .bind(*key.warehouse_id.as_uuid())
            .bind(*key.product_id.as_uuid())
            .bind(*key.variant_id.as_uuid())
            .bind(movement.quantity)
            .bind(movement.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("fold_stock", e))?;

            if !touched.contains(&key) {
                touched.push(key);
            }
            latest.insert(
                key,
                WarehouseStock {
                    warehouse_id: key.warehouse_id,
                    product_id: key.product_id,
                    variant_id: key.variant_id,
                    stock_count: row.stock_count,
                    updated_at: row.updated_at,
                },
            );
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(touched
            .into_iter()
            .filter_map(|key| latest.remove(&key))
            .collect())
    }

    #[instrument(skip(self, key), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Option<WarehouseStock>> {
        let row: Option<StockRow> = sqlx::query_as(
            r#"
            SELECT stock_count, updated_at FROM warehouse_inventory
            WHERE tenant_id = $1 AND warehouse_id = $2 AND product_id = $3 AND variant_id = $4
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*key.warehouse_id.as_uuid())
        .bind(*key.product_id.as_uuid())
        .bind(*key.variant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock", e))?;

        Ok(row.map(|row| WarehouseStock {
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            variant_id: key.variant_id,
            stock_count: row.stock_count,
            updated_at: row.updated_at,
        }))
    }

    #[instrument(skip(self, key), fields(tenant_id = %tenant_id.as_uuid()), err)]
    async fn movements_for_key(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> StoreResult<Vec<StockMovement>> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"
            SELECT payload FROM stock_movements
            WHERE tenant_id = $1 AND warehouse_id = $2 AND product_id = $3 AND variant_id = $4
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*key.warehouse_id.as_uuid())
        .bind(*key.product_id.as_uuid())
        .bind(*key.variant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_for_key", e))?;

        rows.into_iter()
            .map(|row| decode("stock movement", row.payload))
            .collect()
    }
}
