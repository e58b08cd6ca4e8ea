//! Owner scoping. Every business row belongs to exactly one owner; staff
//! users act on behalf of the owner who created them.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::WriteContext,
    entities::{
        outlet,
        product,
        user::{self, UserRole},
    },
    errors::ServiceError,
};

/// The resolved identity a domain operation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantScope {
    pub owner_id: i32,
    pub actor_id: i32,
    pub role: UserRole,
}

impl TenantScope {
    pub fn new(owner_id: i32, actor_id: i32, role: UserRole) -> Self {
        Self {
            owner_id,
            actor_id,
            role,
        }
    }

    pub fn write_context(&self) -> WriteContext {
        WriteContext::new(self.actor_id)
    }

    pub fn is_owner(&self) -> bool {
        self.role == UserRole::Owner
    }

    /// Fails with `Forbidden` when a row belongs to another owner.
    pub fn ensure_owns(&self, owner_id: i32, kind: &str) -> Result<(), ServiceError> {
        if owner_id == self.owner_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "{} belongs to another tenant",
                kind
            )))
        }
    }
}

/// Staff resolve to their creator; owners (and orphaned staff) to themselves.
pub fn resolve_owner(user_id: i32, role: UserRole, creator: Option<i32>) -> i32 {
    match (role, creator) {
        (UserRole::Manager | UserRole::Cashier, Some(owner_id)) => owner_id,
        _ => user_id,
    }
}

/// Loads the user behind a token subject and builds its scope.
pub async fn resolve_scope<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<TenantScope, ServiceError> {
    let user = user::Entity::find_by_id(user_id)
        .filter(user::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::AuthError("user no longer exists".into()))?;

    let role = user
        .role()
        .ok_or_else(|| ServiceError::InternalError(format!("unknown role {}", user.role)))?;
    let owner_id = resolve_owner(user.id, role, user.owner_id);
    debug!(user_id, owner_id, role = %role, "resolved tenant scope");

    Ok(TenantScope::new(owner_id, user.id, role))
}

/// Outlet by external id, restricted to the caller's owner.
pub async fn load_outlet<C: ConnectionTrait>(
    conn: &C,
    scope: &TenantScope,
    outlet_uuid: Uuid,
) -> Result<outlet::Model, ServiceError> {
    let outlet = outlet::Entity::find()
        .filter(outlet::Column::Uuid.eq(outlet_uuid))
        .filter(outlet::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("outlet", outlet_uuid))?;
    scope.ensure_owns(outlet.owner_id, "outlet")?;
    Ok(outlet)
}

/// Product by external id, restricted to the caller's owner.
pub async fn load_product<C: ConnectionTrait>(
    conn: &C,
    scope: &TenantScope,
    product_uuid: Uuid,
) -> Result<product::Model, ServiceError> {
    let product = product::Entity::find()
        .filter(product::Column::Uuid.eq(product_uuid))
        .filter(product::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("product", product_uuid))?;
    scope.ensure_owns(product.owner_id, "product")?;
    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn staff_resolve_to_their_creator() {
        assert_eq!(resolve_owner(7, UserRole::Cashier, Some(2)), 2);
        assert_eq!(resolve_owner(8, UserRole::Manager, Some(2)), 2);
    }

    #[test]
    fn owners_and_orphans_resolve_to_themselves() {
        assert_eq!(resolve_owner(2, UserRole::Owner, None), 2);
        assert_eq!(resolve_owner(2, UserRole::Owner, Some(5)), 2);
        assert_eq!(resolve_owner(9, UserRole::Cashier, None), 9);
    }

    #[test]
    fn foreign_rows_are_forbidden() {
        let scope = TenantScope::new(1, 3, UserRole::Cashier);
        assert!(scope.ensure_owns(1, "outlet").is_ok());
        assert_matches!(scope.ensure_owns(4, "outlet"), Err(ServiceError::Forbidden(_)));
        assert_eq!(scope.write_context().actor_id(), Some(3));
    }
}
