use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use procura_infra::{AdjustOutcome, MovementRecord, OrderDetail, TransferOutcome};
use procura_ledger::{MovementType, StockMovement, WarehouseStock};
use procura_procurement::{
    GoodsReceipt, GoodsReceiptItem, PurchaseInvoice, PurchaseOrder, PurchaseOrderItem,
    SupplierPayment,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub ordered_quantity: u32,
    pub unit_cost: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Option<String>,
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptLineRequest {
    pub purchase_order_item_id: String,
    pub quantity_received: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateGoodsReceiptRequest {
    pub purchase_order_id: String,
    pub items: Vec<ReceiptLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptedLineRequest {
    pub purchase_order_item_id: String,
    pub quantity_accepted: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoodsReceiptRequest {
    pub status: String,
    /// Per-line accepted overrides, honored on completion only.
    pub items: Option<Vec<AcceptedLineRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInvoiceRequest {
    pub goods_receipt_id: String,
    /// Invoiced amount in minor units. `total_amount` is accepted as an
    /// alias for callers that send the stored field name.
    pub subtotal: Option<u64>,
    pub total_amount: Option<u64>,
}

impl CreatePurchaseInvoiceRequest {
    pub fn amount(&self) -> Option<u64> {
        self.subtotal.or(self.total_amount)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSupplierPaymentRequest {
    pub purchase_invoice_id: String,
    pub supplier_id: Option<String>,
    pub amount: u64,
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSupplierPaymentRequest {
    pub amount: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub warehouse_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub physical_quantity: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferItemRequest {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferStockRequest {
    pub source_warehouse_id: String,
    pub destination_warehouse_id: String,
    pub items: Vec<TransferItemRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub product_id: String,
    pub variant_id: String,
    /// Wire name for the warehouse the movement lands in.
    pub outlet_id: String,
    pub movement_type: String,
    pub quantity: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

// -------------------------
// Wire-value parsing
// -------------------------

/// Parse a wire status name into its enum, or a 400 response naming the
/// entity the status belongs to.
pub fn parse_status<T: serde::de::DeserializeOwned>(
    value: &str,
    entity: &str,
) -> Result<T, axum::response::Response> {
    serde_json::from_value(Value::String(value.to_string())).map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            format!("unknown {entity} status: {value}"),
        )
    })
}

pub fn parse_movement_type(value: &str) -> Result<MovementType, axum::response::Response> {
    serde_json::from_value(Value::String(value.to_string())).map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            format!("unknown movement type: {value}"),
        )
    })
}

// -------------------------
// JSON mapping helpers
// -------------------------

fn order_item_to_json(item: &PurchaseOrderItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id.to_string(),
        "product_id": item.product_id.to_string(),
        "variant_id": item.variant_id.map(|v| v.to_string()),
        "ordered_quantity": item.ordered_quantity,
        "unit_cost": item.unit_cost,
    })
}

pub fn order_to_json(order: &PurchaseOrder) -> serde_json::Value {
    serde_json::json!({
        "id": order.id.to_string(),
        "supplier_id": order.supplier_id.map(|s| s.to_string()),
        "status": order.status.to_string(),
        "items": order.items.iter().map(order_item_to_json).collect::<Vec<_>>(),
        "version": order.version,
        "created_at": order.created_at.to_rfc3339(),
        "updated_at": order.updated_at.to_rfc3339(),
    })
}

/// Order plus the per-line receiving picture derived from its receipts.
pub fn order_detail_to_json(detail: &OrderDetail) -> serde_json::Value {
    let items = detail
        .order
        .items
        .iter()
        .map(|item| {
            let mut json = order_item_to_json(item);
            let availability = detail.availability.get(&item.id);
            json["received_quantity"] =
                availability.map(|a| a.accepted_total).unwrap_or(0).into();
            json["in_flight_quantity"] =
                availability.map(|a| a.in_flight_total).unwrap_or(0).into();
            json["available_quantity"] = availability
                .map(|a| a.available())
                .unwrap_or(item.ordered_quantity)
                .into();
            json
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "id": detail.order.id.to_string(),
        "supplier_id": detail.order.supplier_id.map(|s| s.to_string()),
        "status": detail.order.status.to_string(),
        "items": items,
        "version": detail.order.version,
        "created_at": detail.order.created_at.to_rfc3339(),
        "updated_at": detail.order.updated_at.to_rfc3339(),
    })
}

fn receipt_item_to_json(item: &GoodsReceiptItem) -> serde_json::Value {
    serde_json::json!({
        "purchase_order_item_id": item.purchase_order_item_id.to_string(),
        "quantity_received": item.quantity_received,
        "quantity_accepted": item.quantity_accepted,
    })
}

pub fn receipt_to_json(receipt: &GoodsReceipt) -> serde_json::Value {
    serde_json::json!({
        "id": receipt.id.to_string(),
        "purchase_order_id": receipt.purchase_order_id.to_string(),
        "status": receipt.status.to_string(),
        "items": receipt.items.iter().map(receipt_item_to_json).collect::<Vec<_>>(),
        "notes": receipt.notes,
        "created_at": receipt.created_at.to_rfc3339(),
        "updated_at": receipt.updated_at.to_rfc3339(),
    })
}

pub fn invoice_to_json(invoice: &PurchaseInvoice) -> serde_json::Value {
    serde_json::json!({
        "id": invoice.id.to_string(),
        "goods_receipt_id": invoice.goods_receipt_id.to_string(),
        "total_amount": invoice.total_amount,
        "paid_amount": invoice.paid_amount,
        "outstanding_amount": invoice.outstanding_amount(),
        "status": invoice.status.to_string(),
        "version": invoice.version,
        "created_at": invoice.created_at.to_rfc3339(),
        "updated_at": invoice.updated_at.to_rfc3339(),
    })
}

pub fn payment_to_json(payment: &SupplierPayment) -> serde_json::Value {
    serde_json::json!({
        "id": payment.id.to_string(),
        "purchase_invoice_id": payment.purchase_invoice_id.to_string(),
        "supplier_id": payment.supplier_id.map(|s| s.to_string()),
        "payment_number": payment.payment_number.to_string(),
        "amount": payment.amount,
        "payment_method": payment.payment_method,
        "status": payment.status.to_string(),
        "created_at": payment.created_at.to_rfc3339(),
        "updated_at": payment.updated_at.to_rfc3339(),
    })
}

pub fn movement_to_json(movement: &StockMovement) -> serde_json::Value {
    serde_json::json!({
        "id": movement.id.to_string(),
        "warehouse_id": movement.warehouse_id.to_string(),
        "product_id": movement.product_id.to_string(),
        "variant_id": movement.variant_id.to_string(),
        "movement_type": movement.movement_type.to_string(),
        "quantity": movement.quantity,
        "reference_type": movement.reference_type,
        "reference_id": movement.reference_id,
        "notes": movement.notes,
        "created_by": movement.created_by.to_string(),
        "created_at": movement.created_at.to_rfc3339(),
    })
}

pub fn stock_to_json(stock: &WarehouseStock) -> serde_json::Value {
    serde_json::json!({
        "warehouse_id": stock.warehouse_id.to_string(),
        "product_id": stock.product_id.to_string(),
        "variant_id": stock.variant_id.to_string(),
        "stock_count": stock.stock_count,
        "updated_at": stock.updated_at.to_rfc3339(),
    })
}

pub fn adjust_outcome_to_json(outcome: &AdjustOutcome) -> serde_json::Value {
    serde_json::json!({
        "movement_id": outcome.movement_id.map(|id| id.to_string()),
        "delta": outcome.delta,
        "stock_count": outcome.stock_count,
        "already_matches": outcome.already_matches,
    })
}

pub fn transfer_outcome_to_json(outcome: &TransferOutcome) -> serde_json::Value {
    serde_json::json!({
        "transfer_ref": outcome.transfer_ref,
        "movements": outcome.movements.iter().map(movement_to_json).collect::<Vec<_>>(),
        "stocks": outcome.stocks.iter().map(stock_to_json).collect::<Vec<_>>(),
    })
}

pub fn movement_record_to_json(record: &MovementRecord) -> serde_json::Value {
    serde_json::json!({
        "movement": movement_to_json(&record.movement),
        "stock": stock_to_json(&record.stock),
    })
}
