mod common;

use axum::http::{Method, StatusCode};
use common::{uuid_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn owners_cannot_touch_each_others_data() {
    let app = TestApp::new().await;
    let alice = app.register_owner("alice@kasir.test").await;
    let bob = app.register_owner("bob@kasir.test").await;

    let outlet = app.create_outlet(&alice, "retail").await;
    let product = app.create_product(&alice, "SKU-A", "retail_item", 3_000).await;
    app.set_stock(&alice, outlet, product, 4).await;
    let (_, order) = app
        .create_order(&alice, outlet, json!([{ "product_id": product, "quantity": 1 }]))
        .await;
    let order_id = uuid_of(&order);

    let (status, _) = app.get(&format!("/orders/{order_id}"), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get(&format!("/outlets/{outlet}/stocks"), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Bob cannot sell from Alice's outlet even with his own product.
    let own = app.create_product(&bob, "SKU-B", "retail_item", 1_000).await;
    let (status, _) = app
        .create_order(&bob, outlet, json!([{ "product_id": own, "quantity": 1 }]))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.stock_of(&alice, outlet, product).await, dec!(3));

    let (status, _) = app.get(&format!("/orders/{}", Uuid::new_v4()), &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, outlets) = app.get("/outlets", &bob).await;
    assert_eq!(outlets.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/outlets", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_MISSING");

    let (status, _) = app.get("/outlets", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cashiers_sell_on_behalf_of_their_owner() {
    let app = TestApp::new().await;
    let owner = app.register_owner("boss@kasir.test").await;
    let cashier = app.staff_token(&owner, "kasir1@kasir.test", "cashier").await;

    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-S", "retail_item", 2_500).await;
    app.set_stock(&owner, outlet, product, 3).await;

    let (status, outlets) = app.get("/outlets", &cashier).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outlets.as_array().map(Vec::len), Some(1));

    let (status, order) = app
        .create_order(&cashier, outlet, json!([{ "product_id": product, "quantity": 2 }]))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let order_id = uuid_of(&order);

    // The owner sees the cashier's order as their own.
    let (status, seen) = app.get(&format!("/orders/{order_id}"), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["uuid"], order["uuid"]);
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(1));
}

#[tokio::test]
async fn cashiers_are_limited_by_role() {
    let app = TestApp::new().await;
    let owner = app.register_owner("strict@kasir.test").await;
    let cashier = app.staff_token(&owner, "kasir2@kasir.test", "cashier").await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-R", "retail_item", 1_000).await;
    app.set_stock(&owner, outlet, product, 2).await;
    let (_, order) = app
        .create_order(&owner, outlet, json!([{ "product_id": product, "quantity": 1 }]))
        .await;
    let order_id = uuid_of(&order);

    let (status, _) = app
        .post(&format!("/orders/{order_id}/cancel"), json!({}), &cashier)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get(&format!("/reports/outlets/{outlet}/stocks"), &cashier)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put(
            &format!("/outlets/{outlet}/stocks"),
            Some(json!({ "product_id": product, "quantity": 50 })),
            &cashier,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/staff",
            json!({ "name": "X", "email": "x@kasir.test", "password": "whatever-123", "role": "cashier" }),
            &cashier,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn managers_run_procurement_for_the_owner() {
    let app = TestApp::new().await;
    let owner = app.register_owner("chain@kasir.test").await;
    let manager = app.staff_token(&owner, "manager@kasir.test", "manager").await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-M", "retail_item", 4_000).await;

    let (status, supplier) = app
        .post("/suppliers", json!({ "name": "PT Grosir" }), &manager)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{supplier}");

    let (status, po) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": uuid_of(&supplier),
                "outlet_id": outlet,
                "lines": [{ "product_id": product, "quantity": 6, "unit_price": 2500 }],
            }),
            &manager,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{po}");

    let (status, _) = app
        .put(&format!("/purchase-orders/{}/receive", uuid_of(&po)), None, &manager)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(6));

    // Managers cannot open outlets.
    let (status, _) = app
        .post(
            "/outlets",
            json!({ "name": "Branch", "outlet_type": "retail" }),
            &manager,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
