use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, audit::Audited, DbPool},
    entities::{
        outlet,
        product::ProductType,
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line, supplier,
    },
    errors::ServiceError,
    services::{
        stock_ledger::{MovementRef, StockLedger, StockSite},
        tenancy::{self, TenantScope},
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSupplierRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLineInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    pub outlet_id: Uuid,
    #[validate(length(min = 1, message = "a purchase order needs at least one line"))]
    pub lines: Vec<PurchaseOrderLineInput>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub supplier: Option<supplier::Model>,
    pub outlet: Option<outlet::Model>,
    pub lines: Vec<purchase_order_line::Model>,
}

fn line_total(line: &PurchaseOrderLineInput) -> Decimal {
    line.quantity * line.unit_price
}

fn check_line(line: &PurchaseOrderLineInput) -> Result<(), ServiceError> {
    if line.quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "purchase quantity must be greater than zero".into(),
        ));
    }
    if line.unit_price < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "unit price cannot be negative".into(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    ledger: Arc<dyn StockLedger>,
}

impl PurchaseOrderService {
    pub fn new(db_pool: Arc<DbPool>, ledger: Arc<dyn StockLedger>) -> Self {
        Self { db_pool, ledger }
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id))]
    pub async fn create_supplier(
        &self,
        scope: &TenantScope,
        request: CreateSupplierRequest,
    ) -> Result<supplier::Model, ServiceError> {
        request.validate()?;
        let mut active = supplier::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            name: Set(request.name),
            phone: Set(request.phone),
            email: Set(request.email),
            address: Set(request.address),
            ..Default::default()
        };
        active.stamp_created(&scope.write_context());
        let supplier = active.insert(self.db_pool.as_ref()).await?;
        info!(supplier = %supplier.uuid, "supplier created");
        Ok(supplier)
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id))]
    pub async fn create_purchase_order(
        &self,
        scope: &TenantScope,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        request.validate()?;
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();

        let supplier = load_supplier(db, scope, request.supplier_id).await?;
        let outlet = tenancy::load_outlet(db, scope, request.outlet_id).await?;

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            check_line(line)?;
            let product = tenancy::load_product(db, scope, line.product_id).await?;
            if product.is_type(ProductType::FnbMainProduct) {
                return Err(ServiceError::InvalidInput(format!(
                    "product {} is stocked through its recipe",
                    product.uuid
                )));
            }
            if !seen.insert(product.id) {
                return Err(ServiceError::InvalidInput(format!(
                    "product {} listed twice",
                    product.uuid
                )));
            }
            resolved.push((product, line));
        }
        let total: Decimal = request.lines.iter().map(line_total).sum();

        let txn = db::begin(db).await?;
        let mut active = purchase_order::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            supplier_id: Set(supplier.id),
            outlet_id: Set(outlet.id),
            total: Set(total),
            status: Set(PurchaseOrderStatus::Pending.to_string()),
            note: Set(request.note.clone()),
            received_at: Set(None),
            ..Default::default()
        };
        active.stamp_created(&ctx);
        let po = active.insert(&txn).await?;

        for (product, line) in resolved {
            let mut active = purchase_order_line::ActiveModel {
                uuid: Set(Uuid::new_v4()),
                purchase_order_id: Set(po.id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total: Set(line_total(line)),
                ..Default::default()
            };
            active.stamp_created(&ctx);
            active.insert(&txn).await?;
        }
        db::commit(txn).await?;

        counter!("kasir_purchase_orders.created", 1);
        info!(purchase_order = %po.uuid, %total, "purchase order created");
        load_detail(db, po).await
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn get_purchase_order(
        &self,
        scope: &TenantScope,
        po_uuid: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let po = load_purchase_order(db, scope, po_uuid).await?;
        load_detail(db, po).await
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_purchase_orders(
        &self,
        scope: &TenantScope,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let paginator = purchase_order::Entity::find()
            .filter(purchase_order::Column::OwnerId.eq(scope.owner_id))
            .filter(purchase_order::Column::DeletedAt.is_null())
            .order_by_desc(purchase_order::Column::CreatedAt)
            .paginate(self.db_pool.as_ref(), per_page.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Credits every line into the outlet's stock. A purchase order is
    /// received at most once.
    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id, purchase_order = %po_uuid))]
    pub async fn receive_purchase_order(
        &self,
        scope: &TenantScope,
        po_uuid: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();

        let po = load_purchase_order(db, scope, po_uuid).await?;
        ensure_pending(&po)?;

        let txn = db::begin(db).await?;
        let po = db::for_update(purchase_order::Entity::find_by_id(po.id), &txn)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", po_uuid))?;
        ensure_pending(&po)?;

        let now = Utc::now();
        let flipped = purchase_order::Entity::update_many()
            .col_expr(
                purchase_order::Column::Status,
                Expr::value(PurchaseOrderStatus::Completed.to_string()),
            )
            .col_expr(purchase_order::Column::ReceivedAt, Expr::value(Some(now)))
            .col_expr(purchase_order::Column::UpdatedAt, Expr::value(now))
            .col_expr(purchase_order::Column::UpdatedBy, Expr::value(ctx.actor_id()))
            .filter(purchase_order::Column::Id.eq(po.id))
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Pending.to_string()))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(ServiceError::AlreadyReceived(po.uuid));
        }

        let lines = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(po.id))
            .filter(purchase_order_line::Column::DeletedAt.is_null())
            .order_by_asc(purchase_order_line::Column::ProductId)
            .all(&txn)
            .await?;

        let site = StockSite::new(scope.owner_id, po.outlet_id);
        let movement = MovementRef::purchase_order(po.uuid);
        for line in &lines {
            self.ledger
                .adjust(&txn, &ctx, site, line.product_id, line.quantity, &movement)
                .await?;
        }

        let po = purchase_order::Entity::find_by_id(po.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", po_uuid))?;
        db::commit(txn).await?;

        counter!("kasir_purchase_orders.received", 1);
        info!(lines = lines.len(), "purchase order received");
        load_detail(db, po).await
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id, purchase_order = %po_uuid))]
    pub async fn cancel_purchase_order(
        &self,
        scope: &TenantScope,
        po_uuid: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let po = load_purchase_order(db, scope, po_uuid).await?;
        ensure_pending(&po)?;

        let txn = db::begin(db).await?;
        let result = purchase_order::Entity::update_many()
            .col_expr(
                purchase_order::Column::Status,
                Expr::value(PurchaseOrderStatus::Cancelled.to_string()),
            )
            .col_expr(purchase_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(
                purchase_order::Column::UpdatedBy,
                Expr::value(scope.write_context().actor_id()),
            )
            .filter(purchase_order::Column::Id.eq(po.id))
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Pending.to_string()))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "purchase order {} is no longer pending",
                po.uuid
            )));
        }
        let po = purchase_order::Entity::find_by_id(po.id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("purchase order", po_uuid))?;
        db::commit(txn).await?;

        info!("purchase order cancelled");
        load_detail(db, po).await
    }
}

fn ensure_pending(po: &purchase_order::Model) -> Result<(), ServiceError> {
    if po.has_status(PurchaseOrderStatus::Completed) {
        return Err(ServiceError::AlreadyReceived(po.uuid));
    }
    if po.has_status(PurchaseOrderStatus::Cancelled) {
        return Err(ServiceError::Conflict(format!(
            "purchase order {} is cancelled",
            po.uuid
        )));
    }
    Ok(())
}

async fn load_supplier<C: ConnectionTrait>(
    conn: &C,
    scope: &TenantScope,
    supplier_uuid: Uuid,
) -> Result<supplier::Model, ServiceError> {
    let supplier = supplier::Entity::find()
        .filter(supplier::Column::Uuid.eq(supplier_uuid))
        .filter(supplier::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("supplier", supplier_uuid))?;
    scope.ensure_owns(supplier.owner_id, "supplier")?;
    Ok(supplier)
}

async fn load_purchase_order<C: ConnectionTrait>(
    conn: &C,
    scope: &TenantScope,
    po_uuid: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    let po = purchase_order::Entity::find()
        .filter(purchase_order::Column::Uuid.eq(po_uuid))
        .filter(purchase_order::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("purchase order", po_uuid))?;
    scope.ensure_owns(po.owner_id, "purchase order")?;
    Ok(po)
}

async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    po: purchase_order::Model,
) -> Result<PurchaseOrderDetail, ServiceError> {
    let supplier = supplier::Entity::find_by_id(po.supplier_id).one(conn).await?;
    let outlet = outlet::Entity::find_by_id(po.outlet_id).one(conn).await?;
    let lines = purchase_order_line::Entity::find()
        .filter(purchase_order_line::Column::PurchaseOrderId.eq(po.id))
        .filter(purchase_order_line::Column::DeletedAt.is_null())
        .order_by_asc(purchase_order_line::Column::Id)
        .all(conn)
        .await?;
    Ok(PurchaseOrderDetail {
        purchase_order: po,
        supplier,
        outlet,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, unit_price: Decimal) -> PurchaseOrderLineInput {
        PurchaseOrderLineInput {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn total_is_quantity_times_price() {
        assert_eq!(line_total(&line(dec!(2.5), dec!(12000))), dec!(30000));
    }

    #[test]
    fn rejects_empty_and_negative_lines() {
        assert_matches!(check_line(&line(dec!(0), dec!(1))), Err(ServiceError::InvalidInput(_)));
        assert_matches!(check_line(&line(dec!(1), dec!(-1))), Err(ServiceError::InvalidInput(_)));
        assert!(check_line(&line(dec!(1), dec!(0))).is_ok());
    }

    #[test]
    fn terminal_purchase_orders_are_not_pending() {
        let mut po = purchase_order::Model {
            id: 1,
            uuid: Uuid::new_v4(),
            owner_id: 1,
            supplier_id: 1,
            outlet_id: 1,
            total: dec!(0),
            status: PurchaseOrderStatus::Completed.to_string(),
            note: None,
            received_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            created_by: Some(1),
            updated_by: Some(1),
            deleted_by: None,
        };
        assert_matches!(ensure_pending(&po), Err(ServiceError::AlreadyReceived(_)));
        po.status = PurchaseOrderStatus::Cancelled.to_string();
        assert_matches!(ensure_pending(&po), Err(ServiceError::Conflict(_)));
        po.status = PurchaseOrderStatus::Pending.to_string();
        assert!(ensure_pending(&po).is_ok());
    }
}
