mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use common::{dec, uuid_of, TestApp};
use kasir_api::{
    db::{self, WriteContext},
    entities::{outlet, product, stock_movement, user},
    errors::ServiceError,
    services::stock_ledger::{MovementRef, SeaOrmStockLedger, StockLedger, StockSite},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde_json::json;
use uuid::Uuid;

struct Kitchen {
    owner: String,
    outlet: Uuid,
    latte_uuid: Uuid,
    milk_uuid: Uuid,
    beans_uuid: Uuid,
    site: StockSite,
    ctx: WriteContext,
    latte: i32,
    milk: i32,
    beans: i32,
}

async fn product_id(app: &TestApp, uuid: Uuid) -> i32 {
    product::Entity::find()
        .filter(product::Column::Uuid.eq(uuid))
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .expect("product row")
        .id
}

/// FnB outlet with a latte made of 0.2 milk and 0.018 beans, 1 milk and
/// 0.05 beans on hand.
async fn kitchen(app: &TestApp) -> Kitchen {
    let owner = app.register_owner("ledger@kasir.test").await;
    let outlet = app.create_outlet(&owner, "fnb").await;
    let milk = app.create_product(&owner, "ING-MILK", "fnb_component", 0).await;
    let beans = app.create_product(&owner, "ING-BEANS", "fnb_component", 0).await;
    let latte = app.create_product(&owner, "FNB-LATTE", "fnb_main_product", 28_000).await;
    let (status, body) = app
        .put(
            &format!("/products/{latte}/recipe"),
            Some(json!({ "components": [
                { "component_id": milk, "quantity": "0.2" },
                { "component_id": beans, "quantity": "0.018" },
            ]})),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    app.set_stock(&owner, outlet, milk, 1).await;
    let (status, _) = app
        .put(
            &format!("/outlets/{outlet}/stocks"),
            Some(json!({ "product_id": beans, "quantity": "0.05" })),
            &owner,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let db = app.state.db.as_ref();
    let owner_id = user::Entity::find()
        .filter(user::Column::Email.eq("ledger@kasir.test"))
        .one(db)
        .await
        .unwrap()
        .expect("owner row")
        .id;
    let outlet_id = outlet::Entity::find()
        .filter(outlet::Column::Uuid.eq(outlet))
        .one(db)
        .await
        .unwrap()
        .expect("outlet row")
        .id;

    Kitchen {
        owner,
        outlet,
        latte_uuid: latte,
        milk_uuid: milk,
        beans_uuid: beans,
        site: StockSite::new(owner_id, outlet_id),
        ctx: WriteContext::new(owner_id),
        latte: product_id(app, latte).await,
        milk: product_id(app, milk).await,
        beans: product_id(app, beans).await,
    }
}

#[tokio::test]
async fn expand_and_reserve_consumes_recipe_components() {
    let app = TestApp::new().await;
    let k = kitchen(&app).await;
    let ledger = SeaOrmStockLedger::new(app.state.db.clone());
    let movement = MovementRef::order(Uuid::new_v4());

    let txn = db::begin(&app.state.db).await.unwrap();
    let rows = ledger
        .expand_and_reserve(&txn, &k.ctx, k.site, k.latte, dec!(2), &movement)
        .await
        .unwrap();
    db::commit(txn).await.unwrap();

    // Locked and returned in ascending product id.
    let ids: Vec<i32> = rows.iter().map(|r| r.product_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    assert_eq!(ledger.read(k.site, k.milk).await.unwrap().quantity, dec!(0.6));
    assert_eq!(ledger.read(k.site, k.beans).await.unwrap().quantity, dec!(0.014));

    let journal = stock_movement::Entity::find()
        .filter(stock_movement::Column::Reference.eq(movement.reference.clone()))
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(journal.len(), 2);
    assert!(journal.iter().all(|m| m.delta.is_sign_negative()));
}

#[tokio::test]
async fn shortfall_on_one_component_rolls_back_everything() {
    let app = TestApp::new().await;
    let k = kitchen(&app).await;
    let ledger = SeaOrmStockLedger::new(app.state.db.clone());
    let movement = MovementRef::order(Uuid::new_v4());

    let txn = db::begin(&app.state.db).await.unwrap();
    let result = ledger
        .expand_and_reserve(&txn, &k.ctx, k.site, k.latte, dec!(3), &movement)
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    txn.rollback().await.unwrap();

    assert_eq!(ledger.read(k.site, k.milk).await.unwrap().quantity, dec!(1));
    assert_eq!(ledger.read(k.site, k.beans).await.unwrap().quantity, dec!(0.05));
    let journal = stock_movement::Entity::find()
        .filter(stock_movement::Column::Reference.eq(movement.reference.clone()))
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert!(journal.is_empty());
}

#[tokio::test]
async fn reserve_and_adjust_guard_the_floor() {
    let app = TestApp::new().await;
    let k = kitchen(&app).await;
    let ledger = SeaOrmStockLedger::new(app.state.db.clone());

    let txn = db::begin(&app.state.db).await.unwrap();
    let row = ledger
        .reserve(&txn, &k.ctx, k.site, k.milk, dec!(1), &MovementRef::order(Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(row.quantity, dec!(0));
    let result = ledger
        .adjust(&txn, &k.ctx, k.site, k.milk, dec!(-0.1), &MovementRef::adjustment("spill"))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));
    let result = ledger
        .reserve(&txn, &k.ctx, k.site, k.milk, dec!(0), &MovementRef::adjustment("noop"))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));
    db::commit(txn).await.unwrap();

    assert_eq!(ledger.read(k.site, k.milk).await.unwrap().quantity, dec!(0));
}

#[tokio::test]
async fn reads_report_missing_rows() {
    let app = TestApp::new().await;
    let k = kitchen(&app).await;
    let ledger = SeaOrmStockLedger::new(app.state.db.clone());

    assert_matches!(
        ledger.read(k.site, k.latte).await,
        Err(ServiceError::NotFound(_))
    );
    let rows = ledger.read_all(k.site).await.unwrap();
    assert_eq!(rows.len(), 2);

    let elsewhere = StockSite::new(k.site.owner_id, k.site.outlet_id + 1000);
    assert!(ledger.read_all(elsewhere).await.is_err());
}

async fn order_lattes(app: &TestApp, k: &Kitchen, quantity: i32) -> Uuid {
    let (status, order) = app
        .create_order(
            &k.owner,
            k.outlet,
            json!([{ "product_id": k.latte_uuid, "quantity": quantity }]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    uuid_of(&order)
}

#[tokio::test]
async fn stock_rows_equal_the_sum_of_their_movements() {
    let app = TestApp::new().await;
    let k = kitchen(&app).await;

    let (_, supplier) = app
        .post("/suppliers", json!({ "name": "Toko Susu" }), &k.owner)
        .await;
    let (status, po) = app
        .post(
            "/purchase-orders",
            json!({
                "supplier_id": uuid_of(&supplier),
                "outlet_id": k.outlet,
                "lines": [
                    { "product_id": k.beans_uuid, "quantity": "0.333", "unit_price": 90000 },
                    { "product_id": k.milk_uuid, "quantity": "1.7", "unit_price": 18000 },
                ],
            }),
            &k.owner,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{po}");
    let (status, _) = app
        .put(&format!("/purchase-orders/{}/receive", uuid_of(&po)), None, &k.owner)
        .await;
    assert_eq!(status, StatusCode::OK);

    let first = order_lattes(&app, &k, 2).await;
    order_lattes(&app, &k, 1).await;
    let (status, _) = app
        .post(&format!("/orders/{first}/cancel"), json!({}), &k.owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .put(
            &format!("/outlets/{}/stocks", k.outlet),
            Some(json!({ "product_id": k.beans_uuid, "quantity": "0.5" })),
            &k.owner,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    order_lattes(&app, &k, 3).await;

    for (product, expected) in [(k.beans_uuid, dec!(0.446)), (k.milk_uuid, dec!(1.9))] {
        let quantity = app.stock_of(&k.owner, k.outlet, product).await;
        assert_eq!(quantity, expected);
        let journal: Decimal = app
            .movements(&k.owner, k.outlet, product)
            .await
            .iter()
            .map(|m| dec(&m["delta"]))
            .sum();
        assert_eq!(journal, quantity);
    }
}
