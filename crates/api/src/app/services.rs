//! Infrastructure wiring: store selection and the shared application
//! services.
//!
//! `USE_PERSISTENT_STORES=true` selects the Postgres stores (running
//! migrations on startup); anything else wires the in-memory stores, which
//! is also what the black-box tests run against.

use std::sync::Arc;

use sqlx::PgPool;

use procura_core::{
    GoodsReceiptId, PurchaseInvoiceId, PurchaseOrderId, PurchaseOrderItemId, SupplierId,
    SupplierPaymentId, TenantId, UserId, WarehouseId,
};
use procura_infra::store::run_migrations;
use procura_infra::{
    AdjustOutcome, InMemoryLedgerStore, InMemoryProcurementStore, InventoryOrchestrator,
    MovementRecord, OrderDetail, PostgresLedgerStore, PostgresProcurementStore,
    ProcurementService, ServiceError, StockLedger, TransferOutcome,
};
use procura_ledger::{MovementType, StockKey, StockMovement, TransferItem, WarehouseStock};
use procura_procurement::{
    GoodsReceipt, GoodsReceiptStatus, InvoiceStatus, InvoiceVariancePolicy, NewOrderItem,
    PaymentStatus, PurchaseInvoice, PurchaseOrder, PurchaseOrderStatus, SupplierPayment,
};

/// Application services shared across handlers via `Extension`.
///
/// One variant per storage backend; handlers stay backend-agnostic by going
/// through the forwarding methods below.
pub enum AppServices {
    InMemory {
        procurement: ProcurementService<Arc<InMemoryProcurementStore>>,
        inventory: InventoryOrchestrator<Arc<InMemoryLedgerStore>>,
    },
    Persistent {
        procurement: ProcurementService<Arc<PostgresProcurementStore>>,
        inventory: InventoryOrchestrator<Arc<PostgresLedgerStore>>,
    },
}

pub async fn build_services() -> anyhow::Result<AppServices> {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let variance = variance_policy_from_env();

    if use_persistent {
        return build_persistent_services(variance).await;
    }
    Ok(build_in_memory_services(variance))
}

fn variance_policy_from_env() -> InvoiceVariancePolicy {
    match std::env::var("INVOICE_VARIANCE_PERCENT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(percent) => InvoiceVariancePolicy::new(percent),
            Err(_) => {
                tracing::warn!(%raw, "INVOICE_VARIANCE_PERCENT is not a number; using default");
                InvoiceVariancePolicy::default()
            }
        },
        Err(_) => InvoiceVariancePolicy::default(),
    }
}

fn build_in_memory_services(variance: InvoiceVariancePolicy) -> AppServices {
    let procurement_store = Arc::new(InMemoryProcurementStore::new());
    let ledger_store = Arc::new(InMemoryLedgerStore::new());

    AppServices::InMemory {
        procurement: ProcurementService::new(procurement_store, variance),
        inventory: InventoryOrchestrator::new(StockLedger::new(ledger_store)),
    }
}

async fn build_persistent_services(
    variance: InvoiceVariancePolicy,
) -> anyhow::Result<AppServices> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true"))?;

    let pool = PgPool::connect(&database_url).await?;
    run_migrations(&pool).await?;

    let procurement_store = Arc::new(PostgresProcurementStore::new(pool.clone()));
    let ledger_store = Arc::new(PostgresLedgerStore::new(pool));

    Ok(AppServices::Persistent {
        procurement: ProcurementService::new(procurement_store, variance),
        inventory: InventoryOrchestrator::new(StockLedger::new(ledger_store)),
    })
}

impl AppServices {
    pub async fn create_order(
        &self,
        tenant_id: TenantId,
        supplier_id: Option<SupplierId>,
        items: Vec<NewOrderItem>,
    ) -> Result<PurchaseOrder, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement.create_order(tenant_id, supplier_id, items).await
            }
            Self::Persistent { procurement, .. } => {
                procurement.create_order(tenant_id, supplier_id, items).await
            }
        }
    }

    pub async fn order_detail(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
    ) -> Result<OrderDetail, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => procurement.order_detail(tenant_id, id).await,
            Self::Persistent { procurement, .. } => procurement.order_detail(tenant_id, id).await,
        }
    }

    pub async fn set_order_status(
        &self,
        tenant_id: TenantId,
        id: PurchaseOrderId,
        requested: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement.set_order_status(tenant_id, id, requested).await
            }
            Self::Persistent { procurement, .. } => {
                procurement.set_order_status(tenant_id, id, requested).await
            }
        }
    }

    pub async fn create_receipt(
        &self,
        tenant_id: TenantId,
        purchase_order_id: PurchaseOrderId,
        lines: Vec<(PurchaseOrderItemId, u32)>,
        notes: Option<String>,
    ) -> Result<GoodsReceipt, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement
                    .create_receipt(tenant_id, purchase_order_id, lines, notes)
                    .await
            }
            Self::Persistent { procurement, .. } => {
                procurement
                    .create_receipt(tenant_id, purchase_order_id, lines, notes)
                    .await
            }
        }
    }

    pub async fn receipt(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
    ) -> Result<GoodsReceipt, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => procurement.receipt(tenant_id, id).await,
            Self::Persistent { procurement, .. } => procurement.receipt(tenant_id, id).await,
        }
    }

    pub async fn set_receipt_status(
        &self,
        tenant_id: TenantId,
        id: GoodsReceiptId,
        requested: GoodsReceiptStatus,
        accepted: Vec<(PurchaseOrderItemId, u32)>,
    ) -> Result<GoodsReceipt, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement
                    .set_receipt_status(tenant_id, id, requested, accepted)
                    .await
            }
            Self::Persistent { procurement, .. } => {
                procurement
                    .set_receipt_status(tenant_id, id, requested, accepted)
                    .await
            }
        }
    }

    pub async fn create_invoice(
        &self,
        tenant_id: TenantId,
        goods_receipt_id: GoodsReceiptId,
        total_amount: u64,
    ) -> Result<PurchaseInvoice, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement
                    .create_invoice(tenant_id, goods_receipt_id, total_amount)
                    .await
            }
            Self::Persistent { procurement, .. } => {
                procurement
                    .create_invoice(tenant_id, goods_receipt_id, total_amount)
                    .await
            }
        }
    }

    pub async fn invoice(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
    ) -> Result<PurchaseInvoice, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => procurement.invoice(tenant_id, id).await,
            Self::Persistent { procurement, .. } => procurement.invoice(tenant_id, id).await,
        }
    }

    pub async fn set_invoice_status(
        &self,
        tenant_id: TenantId,
        id: PurchaseInvoiceId,
        requested: InvoiceStatus,
    ) -> Result<PurchaseInvoice, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement.set_invoice_status(tenant_id, id, requested).await
            }
            Self::Persistent { procurement, .. } => {
                procurement.set_invoice_status(tenant_id, id, requested).await
            }
        }
    }

    pub async fn create_payment(
        &self,
        tenant_id: TenantId,
        purchase_invoice_id: PurchaseInvoiceId,
        supplier_id: Option<SupplierId>,
        amount: u64,
        payment_method: String,
    ) -> Result<SupplierPayment, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement
                    .create_payment(tenant_id, purchase_invoice_id, supplier_id, amount, payment_method)
                    .await
            }
            Self::Persistent { procurement, .. } => {
                procurement
                    .create_payment(tenant_id, purchase_invoice_id, supplier_id, amount, payment_method)
                    .await
            }
        }
    }

    pub async fn payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
    ) -> Result<SupplierPayment, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => procurement.payment(tenant_id, id).await,
            Self::Persistent { procurement, .. } => procurement.payment(tenant_id, id).await,
        }
    }

    pub async fn update_payment(
        &self,
        tenant_id: TenantId,
        id: SupplierPaymentId,
        new_amount: Option<u64>,
        new_status: Option<PaymentStatus>,
        admin: bool,
    ) -> Result<SupplierPayment, ServiceError> {
        match self {
            Self::InMemory { procurement, .. } => {
                procurement
                    .update_payment(tenant_id, id, new_amount, new_status, admin)
                    .await
            }
            Self::Persistent { procurement, .. } => {
                procurement
                    .update_payment(tenant_id, id, new_amount, new_status, admin)
                    .await
            }
        }
    }

    pub async fn adjust_stock(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        physical_quantity: i64,
        reason: &str,
        actor: UserId,
    ) -> Result<AdjustOutcome, ServiceError> {
        match self {
            Self::InMemory { inventory, .. } => {
                inventory
                    .adjust_stock(tenant_id, key, physical_quantity, reason, actor)
                    .await
            }
            Self::Persistent { inventory, .. } => {
                inventory
                    .adjust_stock(tenant_id, key, physical_quantity, reason, actor)
                    .await
            }
        }
    }

    pub async fn transfer_stock(
        &self,
        tenant_id: TenantId,
        source: WarehouseId,
        destination: WarehouseId,
        items: &[TransferItem],
        notes: Option<&str>,
        actor: UserId,
    ) -> Result<TransferOutcome, ServiceError> {
        match self {
            Self::InMemory { inventory, .. } => {
                inventory
                    .transfer_stock(tenant_id, source, destination, items, notes, actor)
                    .await
            }
            Self::Persistent { inventory, .. } => {
                inventory
                    .transfer_stock(tenant_id, source, destination, items, notes, actor)
                    .await
            }
        }
    }

    pub async fn record_movement(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        movement_type: MovementType,
        quantity: i64,
        reference_type: Option<String>,
        reference_id: Option<String>,
        notes: Option<String>,
        actor: UserId,
    ) -> Result<MovementRecord, ServiceError> {
        match self {
            Self::InMemory { inventory, .. } => {
                inventory
                    .record_movement(
                        tenant_id,
                        key,
                        movement_type,
                        quantity,
                        reference_type,
                        reference_id,
                        notes,
                        actor,
                    )
                    .await
            }
            Self::Persistent { inventory, .. } => {
                inventory
                    .record_movement(
                        tenant_id,
                        key,
                        movement_type,
                        quantity,
                        reference_type,
                        reference_id,
                        notes,
                        actor,
                    )
                    .await
            }
        }
    }

    pub async fn stock(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Option<WarehouseStock>, ServiceError> {
        match self {
            Self::InMemory { inventory, .. } => inventory.ledger().stock(tenant_id, key).await,
            Self::Persistent { inventory, .. } => inventory.ledger().stock(tenant_id, key).await,
        }
    }

    pub async fn movement_history(
        &self,
        tenant_id: TenantId,
        key: &StockKey,
    ) -> Result<Vec<StockMovement>, ServiceError> {
        match self {
            Self::InMemory { inventory, .. } => inventory.ledger().history(tenant_id, key).await,
            Self::Persistent { inventory, .. } => inventory.ledger().history(tenant_id, key).await,
        }
    }
}
