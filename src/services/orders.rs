use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    db::{self, audit::Audited, DbPool},
    entities::{
        order::{self, OrderStatus},
        order_line, order_line_add_on, outlet,
        product::{self, ProductType},
        product_add_on, product_variant,
        stock_movement::{self, MovementReason},
        user,
    },
    errors::ServiceError,
    services::{
        recipes,
        stock_ledger::{MovementRef, StockDemand, StockLedger, StockSite},
        tenancy::{self, TenantScope},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddOnInput {
    /// The add-on product; it must be bound to the line's product.
    pub add_on_id: Uuid,
    #[serde(default = "default_add_on_quantity")]
    #[validate(range(min = 1, message = "add-on quantity must be at least 1"))]
    pub quantity: i32,
}

fn default_add_on_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_line_reference"))]
pub struct OrderLineInput {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    #[validate]
    pub add_ons: Vec<AddOnInput>,
}

fn validate_line_reference(line: &OrderLineInput) -> Result<(), ValidationError> {
    match (line.product_id, line.variant_id) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        _ => Err(ValidationError::new(
            "exactly one of product_id or variant_id is required",
        )),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub outlet_id: Uuid,
    #[validate(length(min = 1, message = "an order needs at least one line"))]
    #[validate]
    pub lines: Vec<OrderLineInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLineDetail {
    #[serde(flatten)]
    pub line: order_line::Model,
    pub product: Option<product::Model>,
    pub variant: Option<product_variant::Model>,
    pub add_ons: Vec<order_line_add_on::Model>,
}

/// An order with everything a receipt needs.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub outlet: Option<outlet::Model>,
    pub creator: Option<user::Model>,
    pub lines: Vec<OrderLineDetail>,
}

/// A line after catalog lookup, before anything is written.
struct PricedLine {
    product: product::Model,
    variant: Option<product_variant::Model>,
    unit_price: Decimal,
    quantity: i32,
    add_ons: Vec<PricedAddOn>,
}

struct PricedAddOn {
    binding: product_add_on::Model,
    quantity: i32,
}

impl PricedLine {
    fn total(&self) -> Decimal {
        let add_ons: Decimal = self
            .add_ons
            .iter()
            .map(|a| a.binding.price * Decimal::from(a.quantity))
            .sum();
        self.unit_price * Decimal::from(self.quantity) + add_ons
    }
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    ledger: Arc<dyn StockLedger>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, ledger: Arc<dyn StockLedger>) -> Self {
        Self { db_pool, ledger }
    }

    /// Prices and persists an order and deducts its stock, all or nothing.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, outlet = %request.outlet_id))]
    pub async fn create_order(
        &self,
        scope: &TenantScope,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();

        let outlet = tenancy::load_outlet(db, scope, request.outlet_id).await?;
        let track_add_ons = user::Entity::find_by_id(scope.owner_id)
            .one(db)
            .await?
            .map(|owner| owner.track_add_on_stock)
            .unwrap_or(false);

        let mut priced = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            priced.push(self.price_line(db, scope, line).await?);
        }

        let txn = db::begin(db).await?;

        let mut active = order::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            outlet_id: Set(outlet.id),
            total: Set(Decimal::ZERO),
            paid_total: Set(Decimal::ZERO),
            status: Set(OrderStatus::Pending.to_string()),
            ..Default::default()
        };
        active.stamp_created(&ctx);
        let order = active.insert(&txn).await?;

        let mut total = Decimal::ZERO;
        let mut demands = Vec::new();

        for line in &priced {
            let line_total = line.total();
            let mut active_line = order_line::ActiveModel {
                uuid: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product.id),
                variant_id: Set(line.variant.as_ref().map(|v| v.id)),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                total: Set(line_total),
                ..Default::default()
            };
            active_line.stamp_created(&ctx);
            let saved = active_line.insert(&txn).await?;

            demands.push(StockDemand::new(
                line.product.id,
                Decimal::from(line.quantity),
            ));

            for add_on in &line.add_ons {
                let mut active_add_on = order_line_add_on::ActiveModel {
                    uuid: Set(Uuid::new_v4()),
                    order_line_id: Set(saved.id),
                    product_add_on_id: Set(add_on.binding.id),
                    add_on_product_id: Set(add_on.binding.add_on_product_id),
                    price: Set(add_on.binding.price),
                    quantity: Set(add_on.quantity),
                    ..Default::default()
                };
                active_add_on.stamp_created(&ctx);
                active_add_on.insert(&txn).await?;

                if track_add_ons {
                    demands.push(StockDemand::new(
                        add_on.binding.add_on_product_id,
                        Decimal::from(add_on.quantity),
                    ));
                }
            }

            total += line_total;
        }

        self.ledger
            .expand_and_reserve_many(
                &txn,
                &ctx,
                StockSite::new(scope.owner_id, outlet.id),
                &demands,
                &MovementRef::order(order.uuid),
            )
            .await
            .map_err(|e| {
                counter!("kasir_orders.rejected", 1);
                e
            })?;

        let mut active: order::ActiveModel = order.into();
        active.total = Set(total);
        active.stamp_updated(&ctx);
        let order = active.update(&txn).await?;

        db::commit(txn).await?;
        counter!("kasir_orders.created", 1);
        info!(order = %order.uuid, %total, "order created");

        load_detail(db, order).await
    }

    async fn price_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &TenantScope,
        line: &OrderLineInput,
    ) -> Result<PricedLine, ServiceError> {
        let (product, variant) = match (line.product_id, line.variant_id) {
            (Some(product_uuid), None) => {
                (tenancy::load_product(conn, scope, product_uuid).await?, None)
            }
            (None, Some(variant_uuid)) => {
                let variant = product_variant::Entity::find()
                    .filter(product_variant::Column::Uuid.eq(variant_uuid))
                    .filter(product_variant::Column::DeletedAt.is_null())
                    .one(conn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("variant", variant_uuid))?;
                scope.ensure_owns(variant.owner_id, "variant")?;
                let product = product::Entity::find_by_id(variant.product_id)
                    .filter(product::Column::DeletedAt.is_null())
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "product of variant {} was deleted",
                            variant_uuid
                        ))
                    })?;
                (product, Some(variant))
            }
            _ => {
                return Err(ServiceError::InvalidInput(
                    "exactly one of product_id or variant_id is required".into(),
                ))
            }
        };

        if product.is_type(ProductType::FnbMainProduct)
            && recipes::components(conn, scope.owner_id, product.id)
                .await?
                .is_empty()
        {
            return Err(ServiceError::RecipeMissing(product.uuid));
        }

        let mut add_ons = Vec::with_capacity(line.add_ons.len());
        for input in &line.add_ons {
            let add_on_product = tenancy::load_product(conn, scope, input.add_on_id).await?;
            let binding = product_add_on::Entity::find()
                .filter(product_add_on::Column::ProductId.eq(product.id))
                .filter(product_add_on::Column::AddOnProductId.eq(add_on_product.id))
                .filter(product_add_on::Column::DeletedAt.is_null())
                .one(conn)
                .await?
                .ok_or(ServiceError::AddOnNotBound(input.add_on_id))?;
            add_ons.push(PricedAddOn {
                binding,
                quantity: input.quantity,
            });
        }

        let unit_price = variant.as_ref().map(|v| v.price).unwrap_or(product.price);
        Ok(PricedLine {
            product,
            variant,
            unit_price,
            quantity: line.quantity,
            add_ons,
        })
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn get_order(
        &self,
        scope: &TenantScope,
        order_uuid: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = load_order(db, scope, order_uuid).await?;
        load_detail(db, order).await
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_orders_by_outlet(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;

        let paginator = order::Entity::find()
            .filter(order::Column::OwnerId.eq(scope.owner_id))
            .filter(order::Column::OutletId.eq(outlet.id))
            .filter(order::Column::DeletedAt.is_null())
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Cancels a pending order with no settled payment and returns the
    /// stock it consumed.
    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn cancel_order(
        &self,
        scope: &TenantScope,
        order_uuid: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();
        let txn = db::begin(db).await?;

        let order = db::for_update(
            order::Entity::find()
                .filter(order::Column::Uuid.eq(order_uuid))
                .filter(order::Column::DeletedAt.is_null()),
            &txn,
        )
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("order", order_uuid))?;
        scope.ensure_owns(order.owner_id, "order")?;

        if order.has_status(OrderStatus::Completed) {
            return Err(ServiceError::OrderAlreadyCompleted(order.uuid));
        }
        if order.has_status(OrderStatus::Cancelled) {
            return Err(ServiceError::Conflict(format!(
                "order {} is already cancelled",
                order.uuid
            )));
        }
        if order.paid_total > Decimal::ZERO {
            return Err(ServiceError::Conflict(format!(
                "order {} has settled payments",
                order.uuid
            )));
        }

        // The journal records exactly what was taken, even if recipes changed since.
        let consumed = stock_movement::Entity::find()
            .filter(stock_movement::Column::OwnerId.eq(scope.owner_id))
            .filter(stock_movement::Column::Reference.eq(order.uuid.to_string()))
            .filter(stock_movement::Column::Reason.eq(MovementReason::Order.to_string()))
            .order_by_asc(stock_movement::Column::ProductId)
            .all(&txn)
            .await?;

        let mut credit: HashMap<i32, Decimal> = HashMap::new();
        for movement in &consumed {
            *credit.entry(movement.product_id).or_default() -= movement.delta;
        }
        let mut credit: Vec<(i32, Decimal)> = credit.into_iter().collect();
        credit.sort_by_key(|(product_id, _)| *product_id);

        let movement = MovementRef::order(order.uuid).with_note("order cancelled");
        let site = StockSite::new(scope.owner_id, order.outlet_id);
        for (product_id, quantity) in credit {
            if quantity > Decimal::ZERO {
                self.ledger
                    .adjust(&txn, &ctx, site, product_id, quantity, &movement)
                    .await?;
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled.to_string());
        active.cancelled_at = Set(Some(Utc::now()));
        active.stamp_updated(&ctx);
        let order = active.update(&txn).await?;

        db::commit(txn).await?;
        counter!("kasir_orders.cancelled", 1);
        warn!(order = %order.uuid, "order cancelled");

        load_detail(db, order).await
    }
}

/// Order by external id, restricted to the caller's owner.
pub async fn load_order<C: ConnectionTrait>(
    conn: &C,
    scope: &TenantScope,
    order_uuid: Uuid,
) -> Result<order::Model, ServiceError> {
    let order = order::Entity::find()
        .filter(order::Column::Uuid.eq(order_uuid))
        .filter(order::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("order", order_uuid))?;
    scope.ensure_owns(order.owner_id, "order")?;
    Ok(order)
}

pub async fn load_detail<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDetail, ServiceError> {
    let outlet = outlet::Entity::find_by_id(order.outlet_id).one(conn).await?;
    let creator = match order.created_by {
        Some(id) => user::Entity::find_by_id(id).one(conn).await?,
        None => None,
    };

    let lines = order_line::Entity::find()
        .filter(order_line::Column::OrderId.eq(order.id))
        .filter(order_line::Column::DeletedAt.is_null())
        .order_by_asc(order_line::Column::Id)
        .all(conn)
        .await?;

    let line_ids: Vec<i32> = lines.iter().map(|l| l.id).collect();
    let mut add_ons: HashMap<i32, Vec<order_line_add_on::Model>> = HashMap::new();
    for add_on in order_line_add_on::Entity::find()
        .filter(order_line_add_on::Column::OrderLineId.is_in(line_ids))
        .filter(order_line_add_on::Column::DeletedAt.is_null())
        .order_by_asc(order_line_add_on::Column::Id)
        .all(conn)
        .await?
    {
        add_ons.entry(add_on.order_line_id).or_default().push(add_on);
    }

    let product_ids: Vec<i32> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<i32, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let variant_ids: Vec<i32> = lines.iter().filter_map(|l| l.variant_id).collect();
    let variants: HashMap<i32, product_variant::Model> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        product_variant::Entity::find()
            .filter(product_variant::Column::Id.is_in(variant_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    let lines = lines
        .into_iter()
        .map(|line| OrderLineDetail {
            product: products.get(&line.product_id).cloned(),
            variant: line.variant_id.and_then(|id| variants.get(&id).cloned()),
            add_ons: add_ons.remove(&line.id).unwrap_or_default(),
            line,
        })
        .collect();

    Ok(OrderDetail {
        order,
        outlet,
        creator,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(product: Option<Uuid>, variant: Option<Uuid>, quantity: i32) -> OrderLineInput {
        OrderLineInput {
            product_id: product,
            variant_id: variant,
            quantity,
            add_ons: vec![],
        }
    }

    #[test]
    fn line_needs_exactly_one_reference() {
        let id = Uuid::new_v4();
        assert!(line(Some(id), None, 1).validate().is_ok());
        assert!(line(None, Some(id), 1).validate().is_ok());
        assert!(line(Some(id), Some(id), 1).validate().is_err());
        assert!(line(None, None, 1).validate().is_err());
    }

    #[test]
    fn quantities_must_be_positive() {
        let id = Uuid::new_v4();
        assert!(line(Some(id), None, 0).validate().is_err());
        assert!(line(Some(id), None, -2).validate().is_err());

        let request = CreateOrderRequest {
            outlet_id: id,
            lines: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn line_total_includes_add_ons() {
        let now = Utc::now();
        let product = product::Model {
            id: 1,
            uuid: Uuid::new_v4(),
            owner_id: 1,
            name: "Es Kopi Susu".into(),
            sku: "EKS".into(),
            product_type: ProductType::FnbMainProduct.to_string(),
            price: dec!(18000),
            unit: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: Some(1),
            updated_by: Some(1),
            deleted_by: None,
        };
        let binding = product_add_on::Model {
            id: 1,
            uuid: Uuid::new_v4(),
            owner_id: 1,
            product_id: 1,
            add_on_product_id: 2,
            price: dec!(3000),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: Some(1),
            updated_by: Some(1),
            deleted_by: None,
        };
        let priced = PricedLine {
            unit_price: product.price,
            product,
            variant: None,
            quantity: 2,
            add_ons: vec![PricedAddOn {
                binding,
                quantity: 2,
            }],
        };
        assert_eq!(priced.total(), dec!(42000));
    }
}
