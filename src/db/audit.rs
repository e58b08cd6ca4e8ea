//! Audit-column stamping for writes.
//!
//! Every business table carries `created_by`, `updated_by` and `deleted_by`.
//! Writes are stamped from a [`WriteContext`] handed down by the caller
//! rather than read from request-scoped state.

use chrono::Utc;
use sea_orm::ActiveValue::Set;

use crate::errors::ServiceError;

/// Who is performing a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(i32),
    /// Process-originated writes: seeding, self-registration, gateway callbacks.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    actor: Actor,
}

impl WriteContext {
    pub fn new(actor_id: i32) -> Self {
        Self {
            actor: Actor::User(actor_id),
        }
    }

    pub fn system() -> Self {
        Self {
            actor: Actor::System,
        }
    }

    /// Builds a context for a user write. A missing actor is rejected.
    pub fn from_actor(actor_id: Option<i32>) -> Result<Self, ServiceError> {
        actor_id
            .map(Self::new)
            .ok_or_else(|| ServiceError::AuthError("write attempted without an actor".into()))
    }

    /// The acting user. Fails for system writes, which may not touch tables
    /// whose actor column is mandatory (the stock journal).
    pub fn actor(&self) -> Result<i32, ServiceError> {
        match self.actor {
            Actor::User(id) => Ok(id),
            Actor::System => Err(ServiceError::AuthError(
                "operation requires an authenticated actor".into(),
            )),
        }
    }

    pub fn actor_id(&self) -> Option<i32> {
        match self.actor {
            Actor::User(id) => Some(id),
            Actor::System => None,
        }
    }
}

/// Implemented by every ActiveModel with the standard audit envelope.
pub trait Audited {
    fn stamp_created(&mut self, ctx: &WriteContext);
    fn stamp_updated(&mut self, ctx: &WriteContext);
    fn stamp_deleted(&mut self, ctx: &WriteContext);
}

macro_rules! impl_audited {
    ($($entity:ident),+ $(,)?) => {
        $(
            impl Audited for crate::entities::$entity::ActiveModel {
                fn stamp_created(&mut self, ctx: &WriteContext) {
                    let now = Utc::now();
                    self.created_at = Set(now);
                    self.updated_at = Set(now);
                    self.deleted_at = Set(None);
                    self.created_by = Set(ctx.actor_id());
                    self.updated_by = Set(ctx.actor_id());
                    self.deleted_by = Set(None);
                }

                fn stamp_updated(&mut self, ctx: &WriteContext) {
                    self.updated_at = Set(Utc::now());
                    self.updated_by = Set(ctx.actor_id());
                }

                fn stamp_deleted(&mut self, ctx: &WriteContext) {
                    let now = Utc::now();
                    self.updated_at = Set(now);
                    self.deleted_at = Set(Some(now));
                    self.updated_by = Set(ctx.actor_id());
                    self.deleted_by = Set(ctx.actor_id());
                }
            }
        )+
    };
}

impl_audited!(
    user,
    outlet,
    product,
    product_variant,
    product_add_on,
    recipe,
    stock,
    order,
    order_line,
    order_line_add_on,
    order_payment,
    user_payment_method,
    gateway_account,
    supplier,
    purchase_order,
    purchase_order_line,
);
