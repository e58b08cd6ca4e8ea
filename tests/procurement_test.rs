mod common;

use axum::http::StatusCode;
use common::{dec, uuid_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

async fn create_supplier(app: &TestApp, token: &str) -> Uuid {
    let (status, body) = app
        .post(
            "/suppliers",
            json!({ "name": "CV Sumber Makmur", "phone": "0812000111", "email": "sales@sumber.test" }),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "create supplier failed: {body}");
    uuid_of(&body)
}

#[tokio::test]
async fn receiving_a_purchase_order_credits_stock_once() {
    let app = TestApp::new().await;
    let owner = app.register_owner("po@kasir.test").await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-PO", "retail_item", 8_000).await;
    app.set_stock(&owner, outlet, product, 5).await;
    let supplier = create_supplier(&app, &owner).await;

    let (status, po) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": supplier,
                "outlet_id": outlet,
                "lines": [{ "product_id": product, "quantity": 10, "unit_price": 6000 }],
            }),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{po}");
    assert_eq!(po["status"], "pending");
    assert_eq!(dec(&po["total"]), dec!(60000));
    let po_id = uuid_of(&po);

    // Nothing moves until the goods arrive.
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(5));

    let (status, received) = app
        .put(&format!("/purchase-orders/{po_id}/receive"), None, &owner)
        .await;
    assert_eq!(status, StatusCode::OK, "{received}");
    assert_eq!(received["status"], "completed");
    assert!(received["received_at"].is_string());
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(15));

    let movements = app.movements(&owner, outlet, product).await;
    let receipts: Vec<_> = movements
        .iter()
        .filter(|m| m["reason"] == "purchase_order")
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(dec(&receipts[0]["delta"]), dec!(10));
    assert_eq!(dec(&receipts[0]["quantity_after"]), dec!(15));

    let (status, _) = app
        .put(&format!("/purchase-orders/{po_id}/receive"), None, &owner)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(15));
    assert_eq!(app.movements(&owner, outlet, product).await.len(), movements.len());
}

#[tokio::test]
async fn receiving_creates_missing_stock_rows() {
    let app = TestApp::new().await;
    let owner = app.register_owner("po-new@kasir.test").await;
    let outlet = app.create_outlet(&owner, "fnb").await;
    let sugar = app.create_product(&owner, "ING-SUGAR", "fnb_component", 0).await;
    let supplier = create_supplier(&app, &owner).await;

    let (_, po) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": supplier,
                "outlet_id": outlet,
                "lines": [{ "product_id": sugar, "quantity": "2.5", "unit_price": 14000 }],
            }),
            &owner,
        )
        .await;
    let po_id = uuid_of(&po);

    let (status, _) = app
        .put(&format!("/purchase-orders/{po_id}/receive"), None, &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stock_of(&owner, outlet, sugar).await, dec!(2.5));
}

#[tokio::test]
async fn cancelled_purchase_orders_cannot_be_received() {
    let app = TestApp::new().await;
    let owner = app.register_owner("po-cancel@kasir.test").await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-C", "retail_item", 1_000).await;
    let supplier = create_supplier(&app, &owner).await;

    let (_, po) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": supplier,
                "outlet_id": outlet,
                "lines": [{ "product_id": product, "quantity": 3, "unit_price": 500 }],
            }),
            &owner,
        )
        .await;
    let po_id = uuid_of(&po);

    let (status, cancelled) = app
        .post(&format!("/purchase-orders/{po_id}/cancel"), json!({}), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = app
        .put(&format!("/purchase-orders/{po_id}/receive"), None, &owner)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.stock_of(&owner, outlet, product).await, dec!(0));
}

#[tokio::test]
async fn recipe_products_are_not_purchased() {
    let app = TestApp::new().await;
    let owner = app.register_owner("po-fnb@kasir.test").await;
    let outlet = app.create_outlet(&owner, "fnb").await;
    let coffee = app.create_product(&owner, "FNB-COFFEE", "fnb_main_product", 18_000).await;
    let supplier = create_supplier(&app, &owner).await;

    let (status, _) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": supplier,
                "outlet_id": outlet,
                "lines": [{ "product_id": coffee, "quantity": 1, "unit_price": 1000 }],
            }),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, empty) = app
        .post(
            "/purchase-orders",
            json!({ "supplier_id": supplier, "outlet_id": outlet, "lines": [] }),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{empty}");
}

#[tokio::test]
async fn purchase_orders_are_listed_per_tenant() {
    let app = TestApp::new().await;
    let owner = app.register_owner("po-list@kasir.test").await;
    let other = app.register_owner("po-list-other@kasir.test").await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-L", "retail_item", 1_000).await;
    let supplier = create_supplier(&app, &owner).await;

    for _ in 0..2 {
        let (status, _) = app
            .post(
                "/purchase-orders",
                json!({
                    "supplier_id": supplier,
                    "outlet_id": outlet,
                    "lines": [{ "product_id": product, "quantity": 1, "unit_price": 700 }],
                }),
                &owner,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app.get("/purchase-orders?per_page=1", &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["pagination"]["total"], 2);
    assert_eq!(page["pagination"]["total_pages"], 2);

    let (_, page) = app.get("/purchase-orders", &other).await;
    assert_eq!(page["pagination"]["total"], 0);
}
