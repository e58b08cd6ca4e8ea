use std::{collections::HashMap, sync::Arc};

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
        product::{self, ProductType},
        recipe,
    },
    errors::ServiceError,
    services::tenancy::{self, TenantScope},
};

/// One resolved recipe edge.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeComponent {
    pub component: product::Model,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecipeEdgeInput {
    pub component_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReplaceRecipeRequest {
    #[validate(length(min = 1, message = "a recipe needs at least one component"))]
    pub components: Vec<RecipeEdgeInput>,
}

/// Live edges of `main_product_id`, ordered by component id. A live edge
/// whose component is gone fails the whole lookup so a recipe is never
/// reserved in part.
pub async fn components<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    main_product_id: i32,
) -> Result<Vec<RecipeComponent>, ServiceError> {
    let edges = recipe::Entity::find()
        .filter(recipe::Column::OwnerId.eq(owner_id))
        .filter(recipe::Column::MainProductId.eq(main_product_id))
        .filter(recipe::Column::DeletedAt.is_null())
        .order_by_asc(recipe::Column::ComponentProductId)
        .all(conn)
        .await?;

    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = edges.iter().map(|e| e.component_product_id).collect();
    let mut products: HashMap<i32, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(ids))
        .filter(product::Column::OwnerId.eq(owner_id))
        .filter(product::Column::DeletedAt.is_null())
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    edges
        .into_iter()
        .map(|edge| {
            products
                .remove(&edge.component_product_id)
                .map(|component| RecipeComponent {
                    component,
                    quantity: edge.quantity,
                })
                .ok_or_else(|| {
                    ServiceError::not_found("recipe component", edge.component_product_id)
                })
        })
        .collect()
}

/// Live main products whose recipe still uses `component_id`.
pub async fn used_by<C: ConnectionTrait>(
    conn: &C,
    owner_id: i32,
    component_id: i32,
) -> Result<Vec<product::Model>, ServiceError> {
    let main_ids: Vec<i32> = recipe::Entity::find()
        .filter(recipe::Column::OwnerId.eq(owner_id))
        .filter(recipe::Column::ComponentProductId.eq(component_id))
        .filter(recipe::Column::DeletedAt.is_null())
        .all(conn)
        .await?
        .into_iter()
        .map(|edge| edge.main_product_id)
        .collect();
    if main_ids.is_empty() {
        return Ok(Vec::new());
    }

    Ok(product::Entity::find()
        .filter(product::Column::Id.is_in(main_ids))
        .filter(product::Column::DeletedAt.is_null())
        .order_by_asc(product::Column::Id)
        .all(conn)
        .await?)
}

#[derive(Clone)]
pub struct RecipeService {
    db_pool: Arc<DbPool>,
}

impl RecipeService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, scope), fields(owner_id = scope.owner_id))]
    pub async fn get_recipe(
        &self,
        scope: &TenantScope,
        main_uuid: Uuid,
    ) -> Result<Vec<RecipeComponent>, ServiceError> {
        let db = self.db_pool.as_ref();
        let main = tenancy::load_product(db, scope, main_uuid).await?;
        components(db, scope.owner_id, main.id).await
    }

    /// Replaces the recipe of an FnB main product. Edges that remain are
    /// updated in place, dropped edges are soft-deleted.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id))]
    pub async fn replace_recipe(
        &self,
        scope: &TenantScope,
        main_uuid: Uuid,
        request: ReplaceRecipeRequest,
    ) -> Result<Vec<RecipeComponent>, ServiceError> {
        request.validate()?;
        let ctx = scope.write_context();
        let db = self.db_pool.as_ref();

        let main = tenancy::load_product(db, scope, main_uuid).await?;
        if !main.is_type(ProductType::FnbMainProduct) {
            return Err(ServiceError::InvalidInput(format!(
                "product {} is not an fnb main product",
                main.uuid
            )));
        }

        let mut wanted: HashMap<i32, Decimal> = HashMap::new();
        for edge in &request.components {
            if edge.quantity <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "component quantity must be greater than zero".into(),
                ));
            }
            let component = tenancy::load_product(db, scope, edge.component_id).await?;
            if !component.is_type(ProductType::FnbComponent) {
                return Err(ServiceError::InvalidInput(format!(
                    "product {} is not an fnb component",
                    component.uuid
                )));
            }
            if wanted.insert(component.id, edge.quantity).is_some() {
                return Err(ServiceError::InvalidInput(format!(
                    "component {} listed twice",
                    component.uuid
                )));
            }
        }

        let txn = db::begin(db).await?;

        let existing = recipe::Entity::find()
            .filter(recipe::Column::MainProductId.eq(main.id))
            .all(&txn)
            .await?;

        for edge in existing {
            let mut active: recipe::ActiveModel = edge.clone().into();
            match wanted.remove(&edge.component_product_id) {
                Some(quantity) => {
                    active.quantity = Set(quantity);
                    active.deleted_at = Set(None);
                    active.deleted_by = Set(None);
                    active.stamp_updated(&ctx);
                    active.update(&txn).await?;
                }
                None if edge.deleted_at.is_none() => {
                    active.stamp_deleted(&ctx);
                    active.update(&txn).await?;
                }
                None => {}
            }
        }

        for (component_id, quantity) in wanted {
            let mut active = recipe::ActiveModel {
                uuid: Set(Uuid::new_v4()),
                owner_id: Set(scope.owner_id),
                main_product_id: Set(main.id),
                component_product_id: Set(component_id),
                quantity: Set(quantity),
                ..Default::default()
            };
            active.stamp_created(&ctx);
            active.insert(&txn).await?;
        }

        db::commit(txn).await?;
        info!(main_product = %main.uuid, "recipe replaced");

        components(db, scope.owner_id, main.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_recipe_fails_validation() {
        let request = ReplaceRecipeRequest { components: Vec::new() };
        assert!(request.validate().is_err());

        let request = ReplaceRecipeRequest {
            components: vec![RecipeEdgeInput {
                component_id: Uuid::new_v4(),
                quantity: dec!(0.25),
            }],
        };
        assert!(request.validate().is_ok());
    }
}
