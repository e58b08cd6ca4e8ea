//! Per-outlet stock quantities and their movement journal.
//!
//! Every mutation runs inside the caller's transaction and appends exactly
//! one `stock_movements` row per stock row it changes. Decrements are a
//! single conditional `UPDATE ... WHERE quantity >= ?` so two writers can
//! never both spend the last unit.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    db::{self, audit::Audited, DbPool, WriteContext},
    entities::{
        outlet,
        product::{self, ProductType},
        stock,
        stock_movement::{self, MovementReason},
    },
    errors::ServiceError,
    services::recipes,
};

/// Why a stock row changed, and which document caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRef {
    pub reason: MovementReason,
    pub reference: String,
    pub note: Option<String>,
}

impl MovementRef {
    pub fn order(order_uuid: Uuid) -> Self {
        Self {
            reason: MovementReason::Order,
            reference: order_uuid.to_string(),
            note: None,
        }
    }

    pub fn purchase_order(po_uuid: Uuid) -> Self {
        Self {
            reason: MovementReason::PurchaseOrder,
            reference: po_uuid.to_string(),
            note: None,
        }
    }

    pub fn adjustment(reference: impl Into<String>) -> Self {
        Self {
            reason: MovementReason::Adjustment,
            reference: reference.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// The owner and outlet a ledger call operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSite {
    pub owner_id: i32,
    pub outlet_id: i32,
}

impl StockSite {
    pub fn new(owner_id: i32, outlet_id: i32) -> Self {
        Self {
            owner_id,
            outlet_id,
        }
    }
}

/// Quantity of a product an order consumes, before recipe expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockDemand {
    pub product_id: i32,
    pub quantity: Decimal,
}

impl StockDemand {
    pub fn new(product_id: i32, quantity: Decimal) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn read(&self, site: StockSite, product_id: i32) -> Result<stock::Model, ServiceError>;

    async fn read_all(&self, site: StockSite) -> Result<Vec<stock::Model>, ServiceError>;

    /// Absolute set. Creates the row when missing.
    async fn set(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        quantity: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError>;

    /// Signed change. A missing row is created only for non-negative deltas.
    async fn adjust(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        delta: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError>;

    async fn reserve(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        quantity: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError>;

    /// Reserves a product, or its recipe components for an FnB main product.
    async fn expand_and_reserve(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        quantity: Decimal,
        movement: &MovementRef,
    ) -> Result<Vec<stock::Model>, ServiceError> {
        self.expand_and_reserve_many(
            txn,
            ctx,
            site,
            &[StockDemand::new(product_id, quantity)],
            movement,
        )
        .await
    }

    /// Expands every demand, merges them by product and reserves in
    /// ascending product id.
    async fn expand_and_reserve_many(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        demands: &[StockDemand],
        movement: &MovementRef,
    ) -> Result<Vec<stock::Model>, ServiceError>;
}

/// Turns product demands into per-stock-row consumption, keyed and ordered
/// by product id. Non-positive quantities are rejected.
pub async fn expand_demands<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    demands: &[StockDemand],
) -> Result<BTreeMap<i32, Decimal>, ServiceError> {
    let mut merged: BTreeMap<i32, Decimal> = BTreeMap::new();

    for demand in demands {
        if demand.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "stock quantity must be greater than zero".into(),
            ));
        }
        let product = owned_product(conn, owner_id, demand.product_id).await?;

        if product.is_type(ProductType::FnbMainProduct) {
            let edges = recipes::components(conn, owner_id, product.id).await?;
            if edges.is_empty() {
                return Err(ServiceError::RecipeMissing(product.uuid));
            }
            for edge in edges {
                *merged.entry(edge.component.id).or_default() += edge.quantity * demand.quantity;
            }
        } else {
            *merged.entry(product.id).or_default() += demand.quantity;
        }
    }

    Ok(merged)
}

async fn owned_product<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    product_id: i32,
) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .filter(product::Column::OwnerId.eq(owner_id))
        .filter(product::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("product", product_id))
}

async fn ensure_outlet<C: ConnectionTrait>(conn: &C, site: StockSite) -> Result<(), ServiceError> {
    outlet::Entity::find_by_id(site.outlet_id)
        .filter(outlet::Column::OwnerId.eq(site.owner_id))
        .filter(outlet::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| ServiceError::not_found("outlet", site.outlet_id))
}

/// Products whose stock is tracked directly. FnB main products derive
/// availability from their components.
async fn stockable_product<C: ConnectionTrait>(
    conn: &C,
    site: StockSite,
    product_id: i32,
) -> Result<product::Model, ServiceError> {
    let product = owned_product(conn, site.owner_id, product_id).await?;
    if product.is_type(ProductType::FnbMainProduct) {
        return Err(ServiceError::InvalidInput(format!(
            "fnb main product {} has no stock of its own",
            product.uuid
        )));
    }
    Ok(product)
}

fn stock_row_filter(site: StockSite, product_id: i32) -> sea_orm::Condition {
    sea_orm::Condition::all()
        .add(stock::Column::OwnerId.eq(site.owner_id))
        .add(stock::Column::OutletId.eq(site.outlet_id))
        .add(stock::Column::ProductId.eq(product_id))
        .add(stock::Column::DeletedAt.is_null())
}

async fn find_row<C: ConnectionTrait>(
    conn: &C,
    site: StockSite,
    product_id: i32,
) -> Result<Option<stock::Model>, ServiceError> {
    Ok(stock::Entity::find()
        .filter(stock_row_filter(site, product_id))
        .one(conn)
        .await?)
}

async fn record_movement(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    delta: Decimal,
    quantity_after: Decimal,
    movement: &MovementRef,
) -> Result<(), ServiceError> {
    stock_movement::ActiveModel {
        uuid: Set(Uuid::new_v4()),
        owner_id: Set(site.owner_id),
        outlet_id: Set(site.outlet_id),
        product_id: Set(product_id),
        delta: Set(delta),
        quantity_after: Set(quantity_after),
        reason: Set(movement.reason.to_string()),
        reference: Set(movement.reference.clone()),
        note: Set(movement.note.clone()),
        created_at: Set(Utc::now()),
        created_by: Set(ctx.actor()?),
        ..Default::default()
    }
    .insert(txn)
    .await?;
    Ok(())
}

async fn insert_row(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    quantity: Decimal,
) -> Result<stock::Model, ServiceError> {
    let mut row = stock::ActiveModel {
        uuid: Set(Uuid::new_v4()),
        owner_id: Set(site.owner_id),
        outlet_id: Set(site.outlet_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        ..Default::default()
    };
    row.stamp_created(ctx);
    Ok(row.insert(txn).await?)
}

/// Adds `delta` to an existing row. Negative deltas only apply when the
/// row holds at least `-delta`. Returns `None` when no row was touched.
async fn apply_delta(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    delta: Decimal,
) -> Result<Option<stock::Model>, ServiceError> {
    if db::has_exact_decimals(txn) {
        apply_delta_in_sql(txn, ctx, site, product_id, delta).await
    } else {
        apply_delta_in_decimal(txn, ctx, site, product_id, delta).await
    }
}

fn floor_guard(condition: sea_orm::Condition, delta: Decimal) -> sea_orm::Condition {
    if delta < Decimal::ZERO {
        condition.add(stock::Column::Quantity.gte(-delta))
    } else {
        condition
    }
}

/// `quantity = quantity + delta` on a NUMERIC column.
async fn apply_delta_in_sql(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    delta: Decimal,
) -> Result<Option<stock::Model>, ServiceError> {
    let result = stock::Entity::update_many()
        .col_expr(
            stock::Column::Quantity,
            Expr::col(stock::Column::Quantity).add(delta),
        )
        .col_expr(stock::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(stock::Column::UpdatedBy, Expr::value(ctx.actor_id()))
        .filter(floor_guard(stock_row_filter(site, product_id), delta))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }
    find_row(txn, site, product_id).await
}

/// Backends that store decimals as floating point (SQLite) get the sum
/// computed here and written back as a literal, so the row always equals
/// the sum of its journal deltas.
async fn apply_delta_in_decimal(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    delta: Decimal,
) -> Result<Option<stock::Model>, ServiceError> {
    let Some(row) = find_row(txn, site, product_id).await? else {
        return Ok(None);
    };
    let quantity = row.quantity + delta;
    if quantity < Decimal::ZERO {
        return Ok(None);
    }

    let now = Utc::now();
    let result = stock::Entity::update_many()
        .col_expr(stock::Column::Quantity, Expr::value(quantity))
        .col_expr(stock::Column::UpdatedAt, Expr::value(now))
        .col_expr(stock::Column::UpdatedBy, Expr::value(ctx.actor_id()))
        .filter(floor_guard(
            sea_orm::Condition::all().add(stock::Column::Id.eq(row.id)),
            delta,
        ))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }
    Ok(Some(stock::Model {
        quantity,
        updated_at: now,
        updated_by: ctx.actor_id(),
        ..row
    }))
}

async fn insufficient(
    txn: &DatabaseTransaction,
    product_id: i32,
    wanted: Decimal,
) -> ServiceError {
    let name = product::Entity::find_by_id(product_id)
        .one(txn)
        .await
        .ok()
        .flatten()
        .map(|p| p.name)
        .unwrap_or_else(|| product_id.to_string());
    counter!("kasir_stock.insufficient", 1);
    ServiceError::InsufficientStock(format!("{} (requested {})", name, wanted.normalize()))
}

async fn decrement(
    txn: &DatabaseTransaction,
    ctx: &WriteContext,
    site: StockSite,
    product_id: i32,
    quantity: Decimal,
    movement: &MovementRef,
) -> Result<stock::Model, ServiceError> {
    match apply_delta(txn, ctx, site, product_id, -quantity).await? {
        Some(row) => {
            record_movement(txn, ctx, site, product_id, -quantity, row.quantity, movement)
                .await?;
            Ok(row)
        }
        None => {
            warn!(outlet_id = site.outlet_id, product_id, %quantity, "insufficient stock");
            Err(insufficient(txn, product_id, quantity).await)
        }
    }
}

#[derive(Clone)]
pub struct SeaOrmStockLedger {
    db_pool: Arc<DbPool>,
}

impl SeaOrmStockLedger {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl StockLedger for SeaOrmStockLedger {
    async fn read(&self, site: StockSite, product_id: i32) -> Result<stock::Model, ServiceError> {
        find_row(self.db_pool.as_ref(), site, product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "stock for product {} at outlet {}",
                    product_id, site.outlet_id
                ))
            })
    }

    async fn read_all(&self, site: StockSite) -> Result<Vec<stock::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        ensure_outlet(db, site).await?;
        Ok(stock::Entity::find()
            .filter(stock::Column::OwnerId.eq(site.owner_id))
            .filter(stock::Column::OutletId.eq(site.outlet_id))
            .filter(stock::Column::DeletedAt.is_null())
            .order_by_asc(stock::Column::ProductId)
            .all(db)
            .await?)
    }

    #[instrument(skip(self, txn, ctx, movement), fields(reason = %movement.reason))]
    async fn set(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        quantity: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError> {
        if quantity < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "stock quantity cannot be negative".into(),
            ));
        }
        ensure_outlet(txn, site).await?;
        stockable_product(txn, site, product_id).await?;

        let current = db::for_update(
            stock::Entity::find().filter(stock_row_filter(site, product_id)),
            txn,
        )
        .one(txn)
        .await?;

        match current {
            Some(row) => {
                let delta = quantity - row.quantity;
                if delta.is_zero() {
                    return Ok(row);
                }
                let mut active: stock::ActiveModel = row.into();
                active.quantity = Set(quantity);
                active.stamp_updated(ctx);
                let row = active.update(txn).await?;
                record_movement(txn, ctx, site, product_id, delta, row.quantity, movement).await?;
                debug!(%delta, "stock set");
                Ok(row)
            }
            None => {
                let row = insert_row(txn, ctx, site, product_id, quantity).await?;
                if !quantity.is_zero() {
                    record_movement(txn, ctx, site, product_id, quantity, quantity, movement)
                        .await?;
                }
                Ok(row)
            }
        }
    }

    #[instrument(skip(self, txn, ctx, movement), fields(reason = %movement.reason))]
    async fn adjust(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        delta: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError> {
        ensure_outlet(txn, site).await?;
        stockable_product(txn, site, product_id).await?;

        if delta < Decimal::ZERO {
            return decrement(txn, ctx, site, product_id, -delta, movement).await;
        }

        let row = match apply_delta(txn, ctx, site, product_id, delta).await? {
            Some(row) => row,
            None => insert_row(txn, ctx, site, product_id, delta).await?,
        };
        if !delta.is_zero() {
            record_movement(txn, ctx, site, product_id, delta, row.quantity, movement).await?;
        }
        Ok(row)
    }

    #[instrument(skip(self, txn, ctx, movement), fields(reason = %movement.reason))]
    async fn reserve(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        product_id: i32,
        quantity: Decimal,
        movement: &MovementRef,
    ) -> Result<stock::Model, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "reserved quantity must be greater than zero".into(),
            ));
        }
        ensure_outlet(txn, site).await?;
        stockable_product(txn, site, product_id).await?;
        decrement(txn, ctx, site, product_id, quantity, movement).await
    }

    #[instrument(skip(self, txn, ctx, demands, movement), fields(reason = %movement.reason, lines = demands.len()))]
    async fn expand_and_reserve_many(
        &self,
        txn: &DatabaseTransaction,
        ctx: &WriteContext,
        site: StockSite,
        demands: &[StockDemand],
        movement: &MovementRef,
    ) -> Result<Vec<stock::Model>, ServiceError> {
        ensure_outlet(txn, site).await?;
        let merged = expand_demands(txn, site.owner_id, demands).await?;

        let mut rows = Vec::with_capacity(merged.len());
        for (product_id, quantity) in merged {
            rows.push(decrement(txn, ctx, site, product_id, quantity, movement).await?);
        }
        counter!("kasir_stock.reservations", 1);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn movement_refs_carry_reason_and_reference() {
        let id = Uuid::new_v4();
        let m = MovementRef::order(id).with_note("order cancelled");
        assert_eq!(m.reason, MovementReason::Order);
        assert_eq!(m.reference, id.to_string());
        assert_eq!(m.note.as_deref(), Some("order cancelled"));

        assert_eq!(
            MovementRef::purchase_order(id).reason.to_string(),
            "purchase_order"
        );
    }

    #[test]
    fn demand_keeps_exact_decimal_quantity() {
        let d = StockDemand::new(3, dec!(0.25));
        assert_eq!(d.quantity * dec!(4), dec!(1));
    }
}
