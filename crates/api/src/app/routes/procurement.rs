use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use procura_core::{
    GoodsReceiptId, ProductId, PurchaseInvoiceId, PurchaseOrderId, PurchaseOrderItemId,
    SupplierId, SupplierPaymentId, VariantId,
};
use procura_procurement::{
    GoodsReceiptStatus, InvoiceStatus, NewOrderItem, PaymentStatus, PurchaseOrderStatus,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/purchase-orders", post(create_purchase_order))
        .route(
            "/purchase-orders/:id",
            get(get_purchase_order).patch(update_purchase_order),
        )
        .route("/goods-receipts", post(create_goods_receipt))
        .route(
            "/goods-receipts/:id",
            get(get_goods_receipt).patch(update_goods_receipt),
        )
        .route("/purchase-invoices", post(create_purchase_invoice))
        .route(
            "/purchase-invoices/:id",
            get(get_purchase_invoice).patch(update_purchase_invoice),
        )
        .route("/supplier-payments", post(create_supplier_payment))
        .route(
            "/supplier-payments/:id",
            get(get_supplier_payment).patch(update_supplier_payment),
        )
}

pub async fn create_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreatePurchaseOrderRequest>,
) -> axum::response::Response {
    let supplier_id = match body.supplier_id {
        Some(raw) => match raw.parse::<SupplierId>() {
            Ok(id) => Some(id),
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid supplier_id"),
        },
        None => None,
    };

    let mut items = Vec::with_capacity(body.items.len());
    for item in body.items {
        let product_id = match item.product_id.parse::<ProductId>() {
            Ok(id) => id,
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid product_id"),
        };
        let variant_id = match item.variant_id {
            Some(raw) => match raw.parse::<VariantId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    return errors::json_error(StatusCode::BAD_REQUEST, "invalid variant_id");
                }
            },
            None => None,
        };
        items.push(NewOrderItem {
            product_id,
            variant_id,
            ordered_quantity: item.ordered_quantity,
            unit_cost: item.unit_cost,
        });
    }

    match services.create_order(tenant.tenant_id(), supplier_id, items).await {
        Ok(order) => errors::json_ok(StatusCode::CREATED, dto::order_to_json(&order)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<PurchaseOrderId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid purchase order id"),
    };

    match services.order_detail(tenant.tenant_id(), id).await {
        Ok(detail) => errors::json_ok(StatusCode::OK, dto::order_detail_to_json(&detail)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn update_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    let id = match id.parse::<PurchaseOrderId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid purchase order id"),
    };
    let requested = match dto::parse_status::<PurchaseOrderStatus>(&body.status, "purchase order")
    {
        Ok(status) => status,
        Err(resp) => return resp,
    };

    match services.set_order_status(tenant.tenant_id(), id, requested).await {
        Ok(order) => errors::json_ok(StatusCode::OK, dto::order_to_json(&order)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn create_goods_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateGoodsReceiptRequest>,
) -> axum::response::Response {
    let purchase_order_id = match body.purchase_order_id.parse::<PurchaseOrderId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid purchase_order_id"),
    };

    let mut lines = Vec::with_capacity(body.items.len());
    for item in body.items {
        let item_id = match item.purchase_order_item_id.parse::<PurchaseOrderItemId>() {
            Ok(id) => id,
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid purchase_order_item_id",
                );
            }
        };
        lines.push((item_id, item.quantity_received));
    }

    match services
        .create_receipt(tenant.tenant_id(), purchase_order_id, lines, body.notes)
        .await
    {
        Ok(receipt) => errors::json_ok(StatusCode::CREATED, dto::receipt_to_json(&receipt)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_goods_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<GoodsReceiptId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid goods receipt id"),
    };

    match services.receipt(tenant.tenant_id(), id).await {
        Ok(receipt) => errors::json_ok(StatusCode::OK, dto::receipt_to_json(&receipt)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn update_goods_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateGoodsReceiptRequest>,
) -> axum::response::Response {
    let id = match id.parse::<GoodsReceiptId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid goods receipt id"),
    };
    let requested = match dto::parse_status::<GoodsReceiptStatus>(&body.status, "goods receipt") {
        Ok(status) => status,
        Err(resp) => return resp,
    };

    let mut accepted = Vec::new();
    for item in body.items.unwrap_or_default() {
        let item_id = match item.purchase_order_item_id.parse::<PurchaseOrderItemId>() {
            Ok(id) => id,
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid purchase_order_item_id",
                );
            }
        };
        accepted.push((item_id, item.quantity_accepted));
    }

    match services
        .set_receipt_status(tenant.tenant_id(), id, requested, accepted)
        .await
    {
        Ok(receipt) => errors::json_ok(StatusCode::OK, dto::receipt_to_json(&receipt)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn create_purchase_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreatePurchaseInvoiceRequest>,
) -> axum::response::Response {
    let goods_receipt_id = match body.goods_receipt_id.parse::<GoodsReceiptId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid goods_receipt_id"),
    };
    let total_amount = match body.amount() {
        Some(amount) => amount,
        None => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invoice requires a subtotal (or total_amount)",
            );
        }
    };

    match services
        .create_invoice(tenant.tenant_id(), goods_receipt_id, total_amount)
        .await
    {
        Ok(invoice) => errors::json_ok(StatusCode::CREATED, dto::invoice_to_json(&invoice)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_purchase_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<PurchaseInvoiceId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid invoice id"),
    };

    match services.invoice(tenant.tenant_id(), id).await {
        Ok(invoice) => errors::json_ok(StatusCode::OK, dto::invoice_to_json(&invoice)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn update_purchase_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStatusRequest>,
) -> axum::response::Response {
    let id = match id.parse::<PurchaseInvoiceId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid invoice id"),
    };
    let requested = match dto::parse_status::<InvoiceStatus>(&body.status, "purchase invoice") {
        Ok(status) => status,
        Err(resp) => return resp,
    };

    match services.set_invoice_status(tenant.tenant_id(), id, requested).await {
        Ok(invoice) => errors::json_ok(StatusCode::OK, dto::invoice_to_json(&invoice)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn create_supplier_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateSupplierPaymentRequest>,
) -> axum::response::Response {
    let purchase_invoice_id = match body.purchase_invoice_id.parse::<PurchaseInvoiceId>() {
        Ok(id) => id,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid purchase_invoice_id");
        }
    };
    let supplier_id = match body.supplier_id {
        Some(raw) => match raw.parse::<SupplierId>() {
            Ok(id) => Some(id),
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid supplier_id"),
        },
        None => None,
    };

    match services
        .create_payment(
            tenant.tenant_id(),
            purchase_invoice_id,
            supplier_id,
            body.amount,
            body.payment_method,
        )
        .await
    {
        Ok(payment) => errors::json_ok(StatusCode::CREATED, dto::payment_to_json(&payment)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_supplier_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<SupplierPaymentId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid payment id"),
    };

    match services.payment(tenant.tenant_id(), id).await {
        Ok(payment) => errors::json_ok(StatusCode::OK, dto::payment_to_json(&payment)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn update_supplier_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateSupplierPaymentRequest>,
) -> axum::response::Response {
    let id = match id.parse::<SupplierPaymentId>() {
        Ok(id) => id,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid payment id"),
    };
    let new_status = match body.status.as_deref() {
        Some(raw) => match dto::parse_status::<PaymentStatus>(raw, "supplier payment") {
            Ok(status) => Some(status),
            Err(resp) => return resp,
        },
        None => None,
    };

    match services
        .update_payment(tenant.tenant_id(), id, body.amount, new_status, actor.is_admin())
        .await
    {
        Ok(payment) => errors::json_ok(StatusCode::OK, dto::payment_to_json(&payment)),
        Err(err) => errors::service_error_to_response(err),
    }
}
