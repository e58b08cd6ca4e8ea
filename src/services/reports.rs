//! Read-only sales and stock reports. Every query is owner scoped and skips
//! soft-deleted rows.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait};
use sea_orm::sea_query::JoinType;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order::{self, OrderStatus},
        order_line, outlet, product, product_variant, stock, stock_movement,
    },
    errors::ServiceError,
    services::tenancy::{self, TenantScope},
};

/// Inclusive calendar range; the end day is covered through midnight.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    /// Half-open `[start, end + 24h)` in UTC.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
        if self.end_date < self.start_date {
            return Err(ServiceError::InvalidInput(
                "end_date must not be before start_date".into(),
            ));
        }
        let start = self.start_date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let end = self
            .end_date
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc() + Duration::hours(24));
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(ServiceError::InvalidInput("invalid date range".into())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithLines {
    #[serde(flatten)]
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutletSalesReport {
    pub outlet: outlet::Model,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub order_count: usize,
    pub gross_total: Decimal,
    pub paid_total: Decimal,
    pub orders: Vec<OrderWithLines>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSalesReport {
    pub product: product::Model,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity_sold: i64,
    pub revenue: Decimal,
    pub lines: Vec<order_line::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockReportRow {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub product_type: String,
    pub quantity: Decimal,
    pub variant_skus: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementRow {
    #[serde(flatten)]
    pub movement: stock_movement::Model,
    pub product_uuid: Option<Uuid>,
}

/// Sums for a sales report. Cancelled orders are listed but not counted.
fn sales_totals(orders: &[OrderWithLines]) -> (usize, Decimal, Decimal) {
    orders
        .iter()
        .filter(|o| !o.order.has_status(OrderStatus::Cancelled))
        .fold((0, Decimal::ZERO, Decimal::ZERO), |(count, gross, paid), o| {
            (count + 1, gross + o.order.total, paid + o.order.paid_total)
        })
}

#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn sales_by_outlet(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
        range: DateRange,
    ) -> Result<OutletSalesReport, ServiceError> {
        let db = self.db_pool.as_ref();
        let (start, end) = range.bounds()?;
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;

        let orders: Vec<OrderWithLines> = order::Entity::find()
            .filter(order::Column::OwnerId.eq(scope.owner_id))
            .filter(order::Column::OutletId.eq(outlet.id))
            .filter(order::Column::DeletedAt.is_null())
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end))
            .order_by_asc(order::Column::CreatedAt)
            .find_with_related(order_line::Entity)
            .all(db)
            .await?
            .into_iter()
            .map(|(order, lines)| OrderWithLines {
                order,
                lines: lines.into_iter().filter(|l| l.deleted_at.is_none()).collect(),
            })
            .collect();

        let (order_count, gross_total, paid_total) = sales_totals(&orders);
        Ok(OutletSalesReport {
            outlet,
            start_date: range.start_date,
            end_date: range.end_date,
            order_count,
            gross_total,
            paid_total,
            orders,
        })
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn sales_by_product(
        &self,
        scope: &TenantScope,
        product_uuid: Uuid,
        range: DateRange,
    ) -> Result<ProductSalesReport, ServiceError> {
        let db = self.db_pool.as_ref();
        let (start, end) = range.bounds()?;
        let product = tenancy::load_product(db, scope, product_uuid).await?;

        let lines = order_line::Entity::find()
            .join(JoinType::InnerJoin, order_line::Relation::Order.def())
            .filter(order_line::Column::ProductId.eq(product.id))
            .filter(order_line::Column::DeletedAt.is_null())
            .filter(order::Column::OwnerId.eq(scope.owner_id))
            .filter(order::Column::DeletedAt.is_null())
            .filter(order::Column::Status.ne(OrderStatus::Cancelled.to_string()))
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end))
            .order_by_asc(order_line::Column::Id)
            .all(db)
            .await?;

        let quantity_sold = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let revenue = lines.iter().map(|l| l.total).sum();
        Ok(ProductSalesReport {
            product,
            start_date: range.start_date,
            end_date: range.end_date,
            quantity_sold,
            revenue,
            lines,
        })
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn stock_by_outlet(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
    ) -> Result<Vec<StockReportRow>, ServiceError> {
        let db = self.db_pool.as_ref();
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;

        let rows = stock::Entity::find()
            .filter(stock::Column::OwnerId.eq(scope.owner_id))
            .filter(stock::Column::OutletId.eq(outlet.id))
            .filter(stock::Column::DeletedAt.is_null())
            .order_by_asc(stock::Column::ProductId)
            .find_also_related(product::Entity)
            .all(db)
            .await?;

        let product_ids: Vec<i32> = rows.iter().map(|(s, _)| s.product_id).collect();
        let mut variant_skus: HashMap<i32, Vec<String>> = HashMap::new();
        if !product_ids.is_empty() {
            let variants = product_variant::Entity::find()
                .filter(product_variant::Column::ProductId.is_in(product_ids))
                .filter(product_variant::Column::OwnerId.eq(scope.owner_id))
                .filter(product_variant::Column::DeletedAt.is_null())
                .order_by_asc(product_variant::Column::Id)
                .all(db)
                .await?;
            for variant in variants {
                variant_skus
                    .entry(variant.product_id)
                    .or_default()
                    .push(variant.sku);
            }
        }

        Ok(rows
            .into_iter()
            .filter_map(|(row, product)| {
                let product = product.filter(|p| p.deleted_at.is_none())?;
                Some(StockReportRow {
                    product_id: product.uuid,
                    variant_skus: variant_skus.remove(&product.id).unwrap_or_default(),
                    name: product.name,
                    sku: product.sku,
                    product_type: product.product_type,
                    quantity: row.quantity,
                })
            })
            .collect())
    }

    /// Movement journal of an outlet, newest first, optionally for one product.
    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn stock_movements(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
        product_uuid: Option<Uuid>,
    ) -> Result<Vec<MovementRow>, ServiceError> {
        let db = self.db_pool.as_ref();
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;

        let mut query = stock_movement::Entity::find()
            .filter(stock_movement::Column::OwnerId.eq(scope.owner_id))
            .filter(stock_movement::Column::OutletId.eq(outlet.id));
        if let Some(product_uuid) = product_uuid {
            let product = tenancy::load_product(db, scope, product_uuid).await?;
            query = query.filter(stock_movement::Column::ProductId.eq(product.id));
        }
        let movements = query
            .order_by_desc(stock_movement::Column::Id)
            .all(db)
            .await?;

        let ids: Vec<i32> = movements.iter().map(|m| m.product_id).collect();
        let uuids: HashMap<i32, Uuid> = if ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(ids))
                .all(db)
                .await?
                .into_iter()
                .map(|p| (p.id, p.uuid))
                .collect()
        };

        Ok(movements
            .into_iter()
            .map(|movement| MovementRow {
                product_uuid: uuids.get(&movement.product_id).copied(),
                movement,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn range_covers_the_whole_end_day() {
        let range = DateRange {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        let (start, end) = range.bounds().unwrap();
        assert_eq!(end - start, Duration::hours(24));
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = DateRange {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_matches!(range.bounds(), Err(ServiceError::InvalidInput(_)));
    }

    fn order_with(status: OrderStatus, total: Decimal, paid: Decimal) -> OrderWithLines {
        OrderWithLines {
            order: order::Model {
                id: 1,
                uuid: Uuid::new_v4(),
                owner_id: 1,
                outlet_id: 1,
                total,
                paid_total: paid,
                status: status.to_string(),
                completed_at: None,
                cancelled_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
                created_by: Some(1),
                updated_by: Some(1),
                deleted_by: None,
            },
            lines: Vec::new(),
        }
    }

    #[test]
    fn cancelled_orders_do_not_count() {
        let orders = vec![
            order_with(OrderStatus::Completed, dec!(20000), dec!(20000)),
            order_with(OrderStatus::Pending, dec!(15000), dec!(5000)),
            order_with(OrderStatus::Cancelled, dec!(9000), dec!(0)),
        ];
        assert_eq!(sales_totals(&orders), (2, dec!(35000), dec!(25000)));
    }
}
