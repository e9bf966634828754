use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::json;

use procura_core::{ProductId, VariantId, WarehouseId};
use procura_ledger::{StockKey, TransferItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/adjust", post(adjust_stock))
        .route("/transfer", post(transfer_stock))
        .route("/movements", post(record_movement))
        .route(
            "/stock/:warehouse_id/:product_id/:variant_id",
            get(get_stock),
        )
        .route(
            "/movements/:warehouse_id/:product_id/:variant_id",
            get(get_movements),
        )
}

fn parse_key(
    warehouse_id: &str,
    product_id: &str,
    variant_id: &str,
) -> Result<StockKey, axum::response::Response> {
    let warehouse_id = warehouse_id
        .parse::<WarehouseId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid warehouse_id"))?;
    let product_id = product_id
        .parse::<ProductId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid product_id"))?;
    let variant_id = variant_id
        .parse::<VariantId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid variant_id"))?;
    Ok(StockKey::new(warehouse_id, product_id, variant_id))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let key = match parse_key(&body.warehouse_id, &body.product_id, &body.variant_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    match services
        .adjust_stock(
            tenant.tenant_id(),
            key,
            body.physical_quantity,
            &body.reason,
            actor.actor_id(),
        )
        .await
    {
        Ok(outcome) => errors::json_ok(StatusCode::OK, dto::adjust_outcome_to_json(&outcome)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn transfer_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::TransferStockRequest>,
) -> axum::response::Response {
    let source = match body.source_warehouse_id.parse::<WarehouseId>() {
        Ok(id) => id,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid source_warehouse_id");
        }
    };
    let destination = match body.destination_warehouse_id.parse::<WarehouseId>() {
        Ok(id) => id,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid destination_warehouse_id",
            );
        }
    };

    let mut items = Vec::with_capacity(body.items.len());
    for item in body.items {
        let product_id = match item.product_id.parse::<ProductId>() {
            Ok(id) => id,
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid product_id"),
        };
        let variant_id = match item.variant_id.parse::<VariantId>() {
            Ok(id) => id,
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid variant_id"),
        };
        items.push(TransferItem {
            product_id,
            variant_id,
            quantity: item.quantity,
        });
    }

    match services
        .transfer_stock(
            tenant.tenant_id(),
            source,
            destination,
            &items,
            body.notes.as_deref(),
            actor.actor_id(),
        )
        .await
    {
        Ok(outcome) => errors::json_ok(StatusCode::OK, dto::transfer_outcome_to_json(&outcome)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    // `outlet_id` is the wire name for the warehouse.
    let key = match parse_key(&body.outlet_id, &body.product_id, &body.variant_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    let movement_type = match dto::parse_movement_type(&body.movement_type) {
        Ok(movement_type) => movement_type,
        Err(resp) => return resp,
    };

    match services
        .record_movement(
            tenant.tenant_id(),
            key,
            movement_type,
            body.quantity,
            body.reference_type,
            body.reference_id,
            body.notes,
            actor.actor_id(),
        )
        .await
    {
        Ok(record) => errors::json_ok(StatusCode::CREATED, dto::movement_record_to_json(&record)),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((warehouse_id, product_id, variant_id)): Path<(String, String, String)>,
) -> axum::response::Response {
    let key = match parse_key(&warehouse_id, &product_id, &variant_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    match services.stock(tenant.tenant_id(), &key).await {
        Ok(Some(stock)) => errors::json_ok(StatusCode::OK, dto::stock_to_json(&stock)),
        // A key that has never moved holds zero.
        Ok(None) => errors::json_ok(
            StatusCode::OK,
            json!({
                "warehouse_id": key.warehouse_id.to_string(),
                "product_id": key.product_id.to_string(),
                "variant_id": key.variant_id.to_string(),
                "stock_count": 0,
                "updated_at": null,
            }),
        ),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((warehouse_id, product_id, variant_id)): Path<(String, String, String)>,
) -> axum::response::Response {
    let key = match parse_key(&warehouse_id, &product_id, &variant_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    match services.movement_history(tenant.tenant_id(), &key).await {
        Ok(movements) => errors::json_ok(
            StatusCode::OK,
            json!({
                "movements": movements.iter().map(dto::movement_to_json).collect::<Vec<_>>(),
            }),
        ),
        Err(err) => errors::service_error_to_response(err),
    }
}
