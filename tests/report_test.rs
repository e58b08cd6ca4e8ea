mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{dec, uuid_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

fn today_range() -> String {
    let today = Utc::now().date_naive();
    format!("start_date={}&end_date={}", today - Duration::days(1), today + Duration::days(1))
}

/// One paid order for 2 units and one cancelled order for 1 unit.
async fn trading_day(app: &TestApp, email: &str) -> (String, Uuid, Uuid) {
    let owner = app.register_owner(email).await;
    let outlet = app.create_outlet(&owner, "retail").await;
    let product = app.create_product(&owner, "SKU-REP", "retail_item", 10_000).await;
    app.set_stock(&owner, outlet, product, 10).await;

    let (_, sold) = app
        .create_order(&owner, outlet, json!([{ "product_id": product, "quantity": 2 }]))
        .await;
    let cash = app.method_id(&owner, "cash").await;
    let (status, _) = app.pay(&owner, uuid_of(&sold), cash, 20_000).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, voided) = app
        .create_order(&owner, outlet, json!([{ "product_id": product, "quantity": 1 }]))
        .await;
    let (status, _) = app
        .post(&format!("/orders/{}/cancel", uuid_of(&voided)), json!({}), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);

    (owner, outlet, product)
}

#[tokio::test]
async fn outlet_sales_skip_cancelled_orders_in_totals() {
    let app = TestApp::new().await;
    let (owner, outlet, _) = trading_day(&app, "report-outlet@kasir.test").await;

    let (status, report) = app
        .get(&format!("/reports/outlets/{outlet}/sales?{}", today_range()), &owner)
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["order_count"], 1);
    assert_eq!(dec(&report["gross_total"]), dec!(20000));
    assert_eq!(dec(&report["paid_total"]), dec!(20000));

    let orders = report["orders"].as_array().expect("orders");
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o["lines"].as_array().map(Vec::len) == Some(1)));
}

#[tokio::test]
async fn product_sales_count_units_and_revenue() {
    let app = TestApp::new().await;
    let (owner, _, product) = trading_day(&app, "report-product@kasir.test").await;

    let (status, report) = app
        .get(&format!("/reports/products/{product}/sales?{}", today_range()), &owner)
        .await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["quantity_sold"], 2);
    assert_eq!(dec(&report["revenue"]), dec!(20000));
}

#[tokio::test]
async fn stock_report_lists_current_quantities_with_variants() {
    let app = TestApp::new().await;
    let (owner, outlet, product) = trading_day(&app, "report-stock@kasir.test").await;
    let (status, _) = app
        .post(
            &format!("/products/{product}/variants"),
            json!({ "name": "Large", "sku": "SKU-REP-L", "price": 12000 }),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, rows) = app
        .get(&format!("/reports/outlets/{outlet}/stocks"), &owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["sku"], "SKU-REP");
    // 10 on hand, 2 sold, the cancelled unit returned.
    assert_eq!(dec(&rows[0]["quantity"]), dec!(8));
    assert_eq!(rows[0]["variant_skus"], json!(["SKU-REP-L"]));
}

#[tokio::test]
async fn out_of_range_and_inverted_ranges() {
    let app = TestApp::new().await;
    let (owner, outlet, _) = trading_day(&app, "report-range@kasir.test").await;

    let (status, report) = app
        .get(
            &format!("/reports/outlets/{outlet}/sales?start_date=2001-01-01&end_date=2001-01-31"),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["order_count"], 0);
    assert_eq!(report["orders"].as_array().map(Vec::len), Some(0));

    let (status, _) = app
        .get(
            &format!("/reports/outlets/{outlet}/sales?start_date=2024-02-02&end_date=2024-02-01"),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
