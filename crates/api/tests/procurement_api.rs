use chrono::Datelike;
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port. With no store env
        // set, every server gets its own fresh in-memory stores.
        let app = procura_api::app::build_app().await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post(client: &reqwest::Client, url: String, tenant: Uuid, body: Value) -> reqwest::Response {
    client
        .post(url)
        .header("x-tenant-id", tenant.to_string())
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn patch(client: &reqwest::Client, url: String, tenant: Uuid, body: Value) -> reqwest::Response {
    client
        .patch(url)
        .header("x-tenant-id", tenant.to_string())
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn patch_admin(
    client: &reqwest::Client,
    url: String,
    tenant: Uuid,
    body: Value,
) -> reqwest::Response {
    client
        .patch(url)
        .header("x-tenant-id", tenant.to_string())
        .header("x-capabilities", "admin")
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn get(client: &reqwest::Client, url: String, tenant: Uuid) -> reqwest::Response {
    client
        .get(url)
        .header("x-tenant-id", tenant.to_string())
        .send()
        .await
        .unwrap()
}

/// Unwrap the success envelope, panicking with the body on failure.
async fn data(res: reqwest::Response) -> Value {
    let status = res.status();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true), "status {status} body {body}");
    body["data"].clone()
}

/// Assert the failure envelope: status, `success: false`, and a numeric
/// `code` repeating the status. Returns the error message.
async fn error_message(res: reqwest::Response, expected: StatusCode) -> String {
    assert_eq!(res.status(), expected);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(false), "body {body}");
    assert_eq!(body["error"]["code"], json!(expected.as_u16()), "body {body}");
    body["error"]["message"].as_str().unwrap().to_string()
}

/// Create a one-line order (quantity x unit_cost) and walk it to `ordered`.
async fn ordered_order(
    client: &reqwest::Client,
    base_url: &str,
    tenant: Uuid,
    quantity: u32,
    unit_cost: u64,
) -> Value {
    let res = post(
        client,
        format!("{base_url}/procurement/purchase-orders"),
        tenant,
        json!({
            "items": [{
                "product_id": Uuid::now_v7().to_string(),
                "ordered_quantity": quantity,
                "unit_cost": unit_cost,
            }],
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let order = data(res).await;
    assert_eq!(order["status"], "draft");

    let id = order["id"].as_str().unwrap();
    for status in ["pending", "approved", "ordered"] {
        let res = patch(
            client,
            format!("{base_url}/procurement/purchase-orders/{id}"),
            tenant,
            json!({ "status": status }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK, "transition to {status}");
    }

    let res = get(
        client,
        format!("{base_url}/procurement/purchase-orders/{id}"),
        tenant,
    )
    .await;
    data(res).await
}

/// Receive `quantity` against the order's single line and complete the
/// receipt (pending -> inspected -> approved -> completed).
async fn completed_receipt(
    client: &reqwest::Client,
    base_url: &str,
    tenant: Uuid,
    order: &Value,
    quantity: u32,
) -> Value {
    let order_id = order["id"].as_str().unwrap();
    let item_id = order["items"][0]["id"].as_str().unwrap();

    let res = post(
        client,
        format!("{base_url}/procurement/goods-receipts"),
        tenant,
        json!({
            "purchase_order_id": order_id,
            "items": [{
                "purchase_order_item_id": item_id,
                "quantity_received": quantity,
            }],
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt = data(res).await;
    assert_eq!(receipt["status"], "pending");

    let receipt_id = receipt["id"].as_str().unwrap();
    for status in ["inspected", "approved", "completed"] {
        let res = patch(
            client,
            format!("{base_url}/procurement/goods-receipts/{receipt_id}"),
            tenant,
            json!({ "status": status }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK, "transition to {status}");
    }

    let res = get(
        client,
        format!("{base_url}/procurement/goods-receipts/{receipt_id}"),
        tenant,
    )
    .await;
    data(res).await
}

#[tokio::test]
async fn healthz_is_public_and_enveloped() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // No tenant header required.
    let res = client
        .get(format!("{}/healthz", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn tenant_header_required_for_domain_routes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!(
            "{}/procurement/purchase-orders/{}",
            srv.base_url,
            Uuid::now_v7()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Malformed tenant ids are rejected the same way.
    let res = client
        .get(format!(
            "{}/procurement/purchase-orders/{}",
            srv.base_url,
            Uuid::now_v7()
        ))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_entity_ids_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let res = get(
        &client,
        format!("{}/procurement/purchase-orders/not-a-uuid", srv.base_url),
        tenant,
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("invalid purchase order id"), "{msg}");
}

#[tokio::test]
async fn full_receipt_rolls_order_to_received() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 100, 250).await;
    completed_receipt(&client, &srv.base_url, tenant, &order, 100).await;

    let res = get(
        &client,
        format!(
            "{}/procurement/purchase-orders/{}",
            srv.base_url,
            order["id"].as_str().unwrap()
        ),
        tenant,
    )
    .await;
    let order = data(res).await;
    assert_eq!(order["status"], "received");
    assert_eq!(order["items"][0]["received_quantity"], 100);
    assert_eq!(order["items"][0]["available_quantity"], 0);
}

#[tokio::test]
async fn partial_receipt_rolls_order_to_partially_received() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 100, 250).await;
    completed_receipt(&client, &srv.base_url, tenant, &order, 60).await;

    let res = get(
        &client,
        format!(
            "{}/procurement/purchase-orders/{}",
            srv.base_url,
            order["id"].as_str().unwrap()
        ),
        tenant,
    )
    .await;
    let order = data(res).await;
    assert_eq!(order["status"], "partially_received");
    assert_eq!(order["items"][0]["received_quantity"], 60);
    assert_eq!(order["items"][0]["available_quantity"], 40);
}

#[tokio::test]
async fn over_receipt_is_rejected_with_remaining_quantity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 100, 250).await;
    completed_receipt(&client, &srv.base_url, tenant, &order, 60).await;

    let res = post(
        &client,
        format!("{}/procurement/goods-receipts", srv.base_url),
        tenant,
        json!({
            "purchase_order_id": order["id"],
            "items": [{
                "purchase_order_item_id": order["items"][0]["id"],
                "quantity_received": 50,
            }],
        }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("remaining available = 40"), "{msg}");
}

#[tokio::test]
async fn order_status_transitions_follow_the_table() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let res = post(
        &client,
        format!("{}/procurement/purchase-orders", srv.base_url),
        tenant,
        json!({
            "items": [{
                "product_id": Uuid::now_v7().to_string(),
                "ordered_quantity": 10,
                "unit_cost": 100,
            }],
        }),
    )
    .await;
    let order = data(res).await;
    let id = order["id"].as_str().unwrap();

    // draft -> received skips the whole chain.
    let res = patch(
        &client,
        format!("{}/procurement/purchase-orders/{id}", srv.base_url),
        tenant,
        json!({ "status": "received" }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(
        msg.contains("invalid purchase order status transition"),
        "{msg}"
    );

    // Unknown status names never reach the transition check.
    let res = patch(
        &client,
        format!("{}/procurement/purchase-orders/{id}", srv.base_url),
        tenant,
        json!({ "status": "finished" }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("unknown purchase order status"), "{msg}");
}

#[tokio::test]
async fn invoice_requires_a_completed_receipt() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 10, 100).await;

    // A receipt that is still pending cannot be invoiced.
    let res = post(
        &client,
        format!("{}/procurement/goods-receipts", srv.base_url),
        tenant,
        json!({
            "purchase_order_id": order["id"],
            "items": [{
                "purchase_order_item_id": order["items"][0]["id"],
                "quantity_received": 10,
            }],
        }),
    )
    .await;
    let receipt = data(res).await;

    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 1000 }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("must be completed before invoicing"), "{msg}");
}

#[tokio::test]
async fn invoice_variance_bounds_the_total() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    // Accepted amount 50 x 100 = 5000; the default 20% allows up to 6000.
    let order = ordered_order(&client, &srv.base_url, tenant, 50, 100).await;
    let receipt = completed_receipt(&client, &srv.base_url, tenant, &order, 50).await;

    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 6001 }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("exceeds allowed variance"), "{msg}");

    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 6000 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let invoice = data(res).await;
    assert_eq!(invoice["total_amount"], 6000);
    assert_eq!(invoice["paid_amount"], 0);
    assert_eq!(invoice["status"], "pending");
}

#[tokio::test]
async fn second_invoice_for_a_receipt_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 10, 100).await;
    let receipt = completed_receipt(&client, &srv.base_url, tenant, &order, 10).await;

    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 1000 }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 1000 }),
    )
    .await;
    let msg = error_message(res, StatusCode::CONFLICT).await;
    assert!(msg.contains("already has invoice"), "{msg}");
}

#[tokio::test]
async fn payments_are_numbered_and_bounded_by_the_balance() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 10, 100).await;
    let receipt = completed_receipt(&client, &srv.base_url, tenant, &order, 10).await;
    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 1000 }),
    )
    .await;
    let invoice = data(res).await;
    let invoice_id = invoice["id"].as_str().unwrap();

    let res = post(
        &client,
        format!("{}/procurement/supplier-payments", srv.base_url),
        tenant,
        json!({
            "purchase_invoice_id": invoice_id,
            "amount": 400,
            "payment_method": "bank_transfer",
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let payment = data(res).await;
    let year = chrono::Utc::now().year();
    assert_eq!(
        payment["payment_number"].as_str().unwrap(),
        format!("PAY-{year}-001")
    );
    assert_eq!(payment["status"], "pending");

    // Pending payments do not count toward the balance; complete it first.
    let res = patch_admin(
        &client,
        format!(
            "{}/procurement/supplier-payments/{}",
            srv.base_url,
            payment["id"].as_str().unwrap()
        ),
        tenant,
        json!({ "status": "completed" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(
        &client,
        format!("{}/procurement/supplier-payments", srv.base_url),
        tenant,
        json!({
            "purchase_invoice_id": invoice_id,
            "amount": 700,
            "payment_method": "bank_transfer",
        }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("remaining balance = 600"), "{msg}");

    // The invoice reflects the completed payment.
    let res = get(
        &client,
        format!("{}/procurement/purchase-invoices/{invoice_id}", srv.base_url),
        tenant,
    )
    .await;
    let invoice = data(res).await;
    assert_eq!(invoice["paid_amount"], 400);
    assert_eq!(invoice["outstanding_amount"], 600);
    assert_eq!(invoice["status"], "partial");
}

#[tokio::test]
async fn direct_payment_completion_needs_the_admin_capability() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant, 10, 100).await;
    let receipt = completed_receipt(&client, &srv.base_url, tenant, &order, 10).await;
    let res = post(
        &client,
        format!("{}/procurement/purchase-invoices", srv.base_url),
        tenant,
        json!({ "goods_receipt_id": receipt["id"], "subtotal": 1000 }),
    )
    .await;
    let invoice = data(res).await;

    let res = post(
        &client,
        format!("{}/procurement/supplier-payments", srv.base_url),
        tenant,
        json!({
            "purchase_invoice_id": invoice["id"],
            "amount": 1000,
            "payment_method": "cash",
        }),
    )
    .await;
    let payment = data(res).await;
    let payment_url = format!(
        "{}/procurement/supplier-payments/{}",
        srv.base_url,
        payment["id"].as_str().unwrap()
    );

    // Without the capability, pending -> completed must walk through
    // processing.
    let res = patch(
        &client,
        payment_url.clone(),
        tenant,
        json!({ "status": "completed" }),
    )
    .await;
    let msg = error_message(res, StatusCode::BAD_REQUEST).await;
    assert!(msg.contains("invalid supplier payment status transition"), "{msg}");

    let res = patch_admin(
        &client,
        payment_url,
        tenant,
        json!({ "status": "completed" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Full completion marks the invoice paid.
    let res = get(
        &client,
        format!(
            "{}/procurement/purchase-invoices/{}",
            srv.base_url,
            invoice["id"].as_str().unwrap()
        ),
        tenant,
    )
    .await;
    let invoice = data(res).await;
    assert_eq!(invoice["paid_amount"], 1000);
    assert_eq!(invoice["status"], "paid");
}

#[tokio::test]
async fn adjust_writes_one_movement_and_is_idempotent() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let warehouse = Uuid::now_v7().to_string();
    let product = Uuid::now_v7().to_string();
    let variant = Uuid::now_v7().to_string();
    let body = json!({
        "warehouse_id": warehouse,
        "product_id": product,
        "variant_id": variant,
        "physical_quantity": 25,
        "reason": "cycle count",
    });

    let res = post(
        &client,
        format!("{}/inventory/adjust", srv.base_url),
        tenant,
        body.clone(),
    )
    .await;
    let outcome = data(res).await;
    assert_eq!(outcome["delta"], 25);
    assert_eq!(outcome["stock_count"], 25);
    assert_eq!(outcome["already_matches"], json!(false));
    assert!(outcome["movement_id"].is_string());

    // Same physical count again: nothing to write.
    let res = post(
        &client,
        format!("{}/inventory/adjust", srv.base_url),
        tenant,
        body,
    )
    .await;
    let outcome = data(res).await;
    assert_eq!(outcome["already_matches"], json!(true));
    assert_eq!(outcome["movement_id"], json!(null));
    assert_eq!(outcome["stock_count"], 25);

    let res = get(
        &client,
        format!(
            "{}/inventory/movements/{warehouse}/{product}/{variant}",
            srv.base_url
        ),
        tenant,
    )
    .await;
    let history = data(res).await;
    let movements = history["movements"].as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["movement_type"], "ADJUSTMENT");
    assert_eq!(movements[0]["quantity"], 25);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let source = Uuid::now_v7().to_string();
    let destination = Uuid::now_v7().to_string();
    let product = Uuid::now_v7().to_string();
    let variant = Uuid::now_v7().to_string();

    // Seed the source with 10.
    let res = post(
        &client,
        format!("{}/inventory/adjust", srv.base_url),
        tenant,
        json!({
            "warehouse_id": source,
            "product_id": product,
            "variant_id": variant,
            "physical_quantity": 10,
            "reason": "initial count",
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(
        &client,
        format!("{}/inventory/transfer", srv.base_url),
        tenant,
        json!({
            "source_warehouse_id": source,
            "destination_warehouse_id": destination,
            "items": [{ "product_id": product, "variant_id": variant, "quantity": 4 }],
        }),
    )
    .await;
    let outcome = data(res).await;
    let movements = outcome["movements"].as_array().unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0]["movement_type"], "TRANSFER_OUT");
    assert_eq!(movements[0]["quantity"], -4);
    assert_eq!(movements[1]["movement_type"], "TRANSFER_IN");
    assert_eq!(movements[1]["quantity"], 4);
    assert!(outcome["transfer_ref"].is_string());

    let res = get(
        &client,
        format!("{}/inventory/stock/{source}/{product}/{variant}", srv.base_url),
        tenant,
    )
    .await;
    assert_eq!(data(res).await["stock_count"], 6);

    let res = get(
        &client,
        format!(
            "{}/inventory/stock/{destination}/{product}/{variant}",
            srv.base_url
        ),
        tenant,
    )
    .await;
    assert_eq!(data(res).await["stock_count"], 4);
}

#[tokio::test]
async fn movement_endpoint_names_the_warehouse_outlet_id() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let outlet = Uuid::now_v7().to_string();
    let product = Uuid::now_v7().to_string();
    let variant = Uuid::now_v7().to_string();

    let res = post(
        &client,
        format!("{}/inventory/movements", srv.base_url),
        tenant,
        json!({
            "product_id": product,
            "variant_id": variant,
            "outlet_id": outlet,
            "movement_type": "PURCHASE",
            "quantity": 5,
            "reference_type": "goods_receipt",
            "reference_id": Uuid::now_v7().to_string(),
        }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let record = data(res).await;
    assert_eq!(record["movement"]["warehouse_id"], outlet);
    assert_eq!(record["movement"]["movement_type"], "PURCHASE");
    assert_eq!(record["stock"]["stock_count"], 5);

    // Zero quantities are meaningless movements.
    let res = post(
        &client,
        format!("{}/inventory/movements", srv.base_url),
        tenant,
        json!({
            "product_id": product,
            "variant_id": variant,
            "outlet_id": outlet,
            "movement_type": "ADJUSTMENT",
            "quantity": 0,
        }),
    )
    .await;
    error_message(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn unmoved_stock_key_reads_zero() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant = Uuid::now_v7();

    let res = get(
        &client,
        format!(
            "{}/inventory/stock/{}/{}/{}",
            srv.base_url,
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7()
        ),
        tenant,
    )
    .await;
    let stock = data(res).await;
    assert_eq!(stock["stock_count"], 0);
    assert_eq!(stock["updated_at"], json!(null));
}

#[tokio::test]
async fn tenant_isolation_hides_other_tenants_records() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant1 = Uuid::now_v7();
    let tenant2 = Uuid::now_v7();

    let order = ordered_order(&client, &srv.base_url, tenant1, 10, 100).await;
    let order_id = order["id"].as_str().unwrap();

    let res = get(
        &client,
        format!("{}/procurement/purchase-orders/{order_id}", srv.base_url),
        tenant2,
    )
    .await;
    let msg = error_message(res, StatusCode::NOT_FOUND).await;
    assert!(msg.contains("not found"), "{msg}");

    // Writes under the wrong tenant are indistinguishable from missing rows.
    let res = patch(
        &client,
        format!("{}/procurement/purchase-orders/{order_id}", srv.base_url),
        tenant2,
        json!({ "status": "cancelled" }),
    )
    .await;
    error_message(res, StatusCode::NOT_FOUND).await;
}
