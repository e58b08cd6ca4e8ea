//! Outlets, products, variants, add-on bindings and manual stock counts.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{self, audit::Audited, DbPool},
    entities::{
        outlet::{self, OutletType},
        product::{self, ProductType},
        product_add_on, product_variant, recipe, stock,
    },
    errors::ServiceError,
    services::{
        recipes,
        stock_ledger::{MovementRef, StockLedger, StockSite},
        tenancy::{self, TenantScope},
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOutletRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub address: Option<String>,
    pub outlet_type: OutletType,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 160))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub product_type: ProductType,
    pub price: Decimal,
    #[validate(length(max = 16))]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BindAddOnRequest {
    pub add_on_id: Uuid,
    /// Defaults to the add-on product's own price.
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetStockRequest {
    pub product_id: Uuid,
    pub quantity: Decimal,
    #[validate(length(max = 255))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockView {
    #[serde(flatten)]
    pub stock: stock::Model,
    pub product_uuid: Uuid,
}

fn non_negative(amount: Decimal, field: &str) -> Result<(), ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(())
}

/// Which product types may carry a binding to an add-on.
fn accepts_add_ons(kind: Option<ProductType>) -> bool {
    matches!(
        kind,
        Some(ProductType::RetailItem | ProductType::FnbMainProduct)
    )
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    ledger: Arc<dyn StockLedger>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, ledger: Arc<dyn StockLedger>) -> Self {
        Self { db_pool, ledger }
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_outlets(&self, scope: &TenantScope) -> Result<Vec<outlet::Model>, ServiceError> {
        Ok(outlet::Entity::find()
            .filter(outlet::Column::OwnerId.eq(scope.owner_id))
            .filter(outlet::Column::DeletedAt.is_null())
            .order_by_asc(outlet::Column::Id)
            .all(self.db_pool.as_ref())
            .await?)
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id))]
    pub async fn create_outlet(
        &self,
        scope: &TenantScope,
        request: CreateOutletRequest,
    ) -> Result<outlet::Model, ServiceError> {
        request.validate()?;
        let mut active = outlet::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            name: Set(request.name),
            address: Set(request.address),
            outlet_type: Set(request.outlet_type.to_string()),
            ..Default::default()
        };
        active.stamp_created(&scope.write_context());
        let outlet = active.insert(self.db_pool.as_ref()).await?;
        info!(outlet = %outlet.uuid, "outlet created");
        Ok(outlet)
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, sku = %request.sku))]
    pub async fn create_product(
        &self,
        scope: &TenantScope,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        non_negative(request.price, "price")?;
        let db = self.db_pool.as_ref();
        ensure_sku_free(db, scope.owner_id, &request.sku).await?;

        let mut active = product::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            name: Set(request.name),
            sku: Set(request.sku),
            product_type: Set(request.product_type.to_string()),
            price: Set(request.price),
            unit: Set(request.unit),
            ..Default::default()
        };
        active.stamp_created(&scope.write_context());
        let product = active.insert(db).await?;
        info!(product = %product.uuid, kind = %product.product_type, "product created");
        Ok(product)
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn list_products(&self, scope: &TenantScope) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::OwnerId.eq(scope.owner_id))
            .filter(product::Column::DeletedAt.is_null())
            .order_by_asc(product::Column::Id)
            .all(self.db_pool.as_ref())
            .await?)
    }

    /// Soft-deletes a product together with its variants, add-on bindings
    /// and recipe edges. Past order lines keep their price snapshots.
    /// A component still used by a live recipe is refused with a conflict.
    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id, product = %product_uuid))]
    pub async fn delete_product(
        &self,
        scope: &TenantScope,
        product_uuid: Uuid,
    ) -> Result<(), ServiceError> {
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();
        let product = tenancy::load_product(db, scope, product_uuid).await?;

        let txn = db::begin(db).await?;
        let dependents = recipes::used_by(&txn, scope.owner_id, product.id).await?;
        if !dependents.is_empty() {
            let names: Vec<&str> = dependents.iter().map(|p| p.name.as_str()).collect();
            return Err(ServiceError::Conflict(format!(
                "{} is used in the recipe of {}",
                product.name,
                names.join(", ")
            )));
        }

        let variants = product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product.id))
            .filter(product_variant::Column::DeletedAt.is_null())
            .all(&txn)
            .await?;
        for variant in variants {
            let mut active: product_variant::ActiveModel = variant.into();
            active.stamp_deleted(&ctx);
            active.update(&txn).await?;
        }

        let bindings = product_add_on::Entity::find()
            .filter(
                product_add_on::Column::ProductId
                    .eq(product.id)
                    .or(product_add_on::Column::AddOnProductId.eq(product.id)),
            )
            .filter(product_add_on::Column::DeletedAt.is_null())
            .all(&txn)
            .await?;
        for binding in bindings {
            let mut active: product_add_on::ActiveModel = binding.into();
            active.stamp_deleted(&ctx);
            active.update(&txn).await?;
        }

        let edges = recipe::Entity::find()
            .filter(recipe::Column::MainProductId.eq(product.id))
            .filter(recipe::Column::DeletedAt.is_null())
            .all(&txn)
            .await?;
        for edge in edges {
            let mut active: recipe::ActiveModel = edge.into();
            active.stamp_deleted(&ctx);
            active.update(&txn).await?;
        }

        let mut active: product::ActiveModel = product.into();
        active.stamp_deleted(&ctx);
        active.update(&txn).await?;
        db::commit(txn).await?;

        info!("product deleted");
        Ok(())
    }

    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, product = %product_uuid))]
    pub async fn create_variant(
        &self,
        scope: &TenantScope,
        product_uuid: Uuid,
        request: CreateVariantRequest,
    ) -> Result<product_variant::Model, ServiceError> {
        request.validate()?;
        non_negative(request.price, "price")?;
        let db = self.db_pool.as_ref();
        let product = tenancy::load_product(db, scope, product_uuid).await?;
        if product.is_type(ProductType::FnbComponent) {
            return Err(ServiceError::InvalidInput(
                "fnb components are not sold and cannot have variants".into(),
            ));
        }

        let taken = product_variant::Entity::find()
            .filter(product_variant::Column::OwnerId.eq(scope.owner_id))
            .filter(product_variant::Column::Sku.eq(request.sku.as_str()))
            .filter(product_variant::Column::DeletedAt.is_null())
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::Conflict(format!(
                "variant sku {} already exists",
                request.sku
            )));
        }

        let mut active = product_variant::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            owner_id: Set(scope.owner_id),
            product_id: Set(product.id),
            name: Set(request.name),
            sku: Set(request.sku),
            price: Set(request.price),
            ..Default::default()
        };
        active.stamp_created(&scope.write_context());
        let variant = active.insert(db).await?;
        info!(variant = %variant.uuid, "variant created");
        Ok(variant)
    }

    /// Binds an add-on product to a sellable product. Rebinding updates the
    /// price of the existing binding.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, product = %product_uuid))]
    pub async fn bind_add_on(
        &self,
        scope: &TenantScope,
        product_uuid: Uuid,
        request: BindAddOnRequest,
    ) -> Result<product_add_on::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();
        let product = tenancy::load_product(db, scope, product_uuid).await?;
        if !accepts_add_ons(product.product_type()) {
            return Err(ServiceError::InvalidInput(format!(
                "product {} cannot carry add-ons",
                product.uuid
            )));
        }
        let add_on = tenancy::load_product(db, scope, request.add_on_id).await?;
        if !add_on.is_type(ProductType::AddOn) {
            return Err(ServiceError::InvalidInput(format!(
                "product {} is not an add-on",
                add_on.uuid
            )));
        }
        let price = request.price.unwrap_or(add_on.price);
        non_negative(price, "price")?;

        let existing = product_add_on::Entity::find()
            .filter(product_add_on::Column::ProductId.eq(product.id))
            .filter(product_add_on::Column::AddOnProductId.eq(add_on.id))
            .filter(product_add_on::Column::DeletedAt.is_null())
            .one(db)
            .await?;

        let binding = match existing {
            Some(binding) => {
                let mut active: product_add_on::ActiveModel = binding.into();
                active.price = Set(price);
                active.stamp_updated(&ctx);
                active.update(db).await?
            }
            None => {
                let mut active = product_add_on::ActiveModel {
                    uuid: Set(Uuid::new_v4()),
                    owner_id: Set(scope.owner_id),
                    product_id: Set(product.id),
                    add_on_product_id: Set(add_on.id),
                    price: Set(price),
                    ..Default::default()
                };
                active.stamp_created(&ctx);
                active.insert(db).await?
            }
        };
        info!(add_on = %add_on.uuid, %price, "add-on bound");
        Ok(binding)
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id, outlet = %outlet_uuid))]
    pub async fn list_stock(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
    ) -> Result<Vec<StockView>, ServiceError> {
        let db = self.db_pool.as_ref();
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;
        let rows = self
            .ledger
            .read_all(StockSite::new(scope.owner_id, outlet.id))
            .await?;
        let ids: Vec<i32> = rows.iter().map(|r| r.product_id).collect();
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|stock| {
                products
                    .iter()
                    .find(|p| p.id == stock.product_id)
                    .map(|p| StockView {
                        product_uuid: p.uuid,
                        stock,
                    })
            })
            .collect())
    }

    /// Absolute stock count for one product, journaled as an adjustment.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id, outlet = %outlet_uuid))]
    pub async fn set_stock(
        &self,
        scope: &TenantScope,
        outlet_uuid: Uuid,
        request: SetStockRequest,
    ) -> Result<StockView, ServiceError> {
        request.validate()?;
        let db = self.db_pool.as_ref();
        let ctx = scope.write_context();
        let outlet = tenancy::load_outlet(db, scope, outlet_uuid).await?;
        let product = tenancy::load_product(db, scope, request.product_id).await?;

        let mut movement = MovementRef::adjustment(Uuid::new_v4().to_string());
        if let Some(note) = request.note {
            movement = movement.with_note(note);
        }

        let txn = db::begin(db).await?;
        let stock = self
            .ledger
            .set(
                &txn,
                &ctx,
                StockSite::new(scope.owner_id, outlet.id),
                product.id,
                request.quantity,
                &movement,
            )
            .await?;
        db::commit(txn).await?;

        Ok(StockView {
            stock,
            product_uuid: product.uuid,
        })
    }
}

async fn ensure_sku_free<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    sku: &str,
) -> Result<(), ServiceError> {
    let taken = product::Entity::find()
        .filter(product::Column::OwnerId.eq(owner_id))
        .filter(product::Column::Sku.eq(sku))
        .filter(product::Column::DeletedAt.is_null())
        .one(conn)
        .await?;
    match taken {
        Some(_) => Err(ServiceError::Conflict(format!("sku {} already exists", sku))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn only_sellable_products_take_add_ons() {
        assert!(accepts_add_ons(Some(ProductType::RetailItem)));
        assert!(accepts_add_ons(Some(ProductType::FnbMainProduct)));
        assert!(!accepts_add_ons(Some(ProductType::AddOn)));
        assert!(!accepts_add_ons(Some(ProductType::FnbComponent)));
        assert!(!accepts_add_ons(None));
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(non_negative(dec!(0), "price").is_ok());
        assert!(matches!(
            non_negative(dec!(-1), "price"),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
