//! Permission strings checked by the route guards.
//!
//! Each one is `resource:action` and is matched against the policy rules
//! in `config/policy.csv`.

use std::collections::HashSet;

use lazy_static::lazy_static;

/// Split a permission into its resource and action halves. A bare
/// resource means any action.
pub fn split(permission: &str) -> (&str, &str) {
    permission.split_once(':').unwrap_or((permission, "*"))
}

lazy_static! {
    /// Every resource a guard can ask about. Policy rules naming anything
    /// else are rejected at load time.
    pub static ref RESOURCES: HashSet<&'static str> = [
        consts::OUTLETS_READ,
        consts::PRODUCTS_READ,
        consts::RECIPES_READ,
        consts::STOCKS_READ,
        consts::ORDERS_READ,
        consts::PAYMENTS_READ,
        consts::PAYMENT_METHODS_READ,
        consts::SUPPLIERS_CREATE,
        consts::PURCHASE_ORDERS_READ,
        consts::REPORTS_READ,
        consts::STAFF_CREATE,
        consts::OTP_CREATE,
    ]
    .into_iter()
    .map(|permission| split(permission).0)
    .collect();
}

/// `*` or a resource some route checks.
pub fn is_known_resource(resource: &str) -> bool {
    resource == "*" || RESOURCES.contains(resource)
}

pub mod consts {
    // Outlets
    pub const OUTLETS_READ: &str = "outlets:read";
    pub const OUTLETS_CREATE: &str = "outlets:create";

    // Products
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_CREATE: &str = "products:create";
    pub const PRODUCTS_UPDATE: &str = "products:update";
    pub const PRODUCTS_DELETE: &str = "products:delete";

    // Recipes
    pub const RECIPES_READ: &str = "recipes:read";
    pub const RECIPES_UPDATE: &str = "recipes:update";

    // Stock
    pub const STOCKS_READ: &str = "stocks:read";
    pub const STOCKS_UPDATE: &str = "stocks:update";

    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_CANCEL: &str = "orders:cancel";

    // Payments
    pub const PAYMENTS_READ: &str = "payments:read";
    pub const PAYMENTS_CREATE: &str = "payments:create";
    pub const PAYMENT_METHODS_READ: &str = "payment_methods:read";
    pub const PAYMENT_METHODS_UPDATE: &str = "payment_methods:update";

    // Procurement
    pub const SUPPLIERS_CREATE: &str = "suppliers:create";
    pub const PURCHASE_ORDERS_READ: &str = "purchase_orders:read";
    pub const PURCHASE_ORDERS_CREATE: &str = "purchase_orders:create";
    pub const PURCHASE_ORDERS_RECEIVE: &str = "purchase_orders:receive";
    pub const PURCHASE_ORDERS_CANCEL: &str = "purchase_orders:cancel";

    // Reports
    pub const REPORTS_READ: &str = "reports:read";

    // Accounts
    pub const STAFF_CREATE: &str = "staff:create";
    pub const OTP_CREATE: &str = "otp:create";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_resource_and_action() {
        assert_eq!(split(consts::ORDERS_CANCEL), ("orders", "cancel"));
        assert_eq!(split("reports"), ("reports", "*"));
    }

    #[test]
    fn every_guarded_resource_is_registered() {
        for permission in [
            consts::OUTLETS_CREATE,
            consts::PRODUCTS_DELETE,
            consts::RECIPES_UPDATE,
            consts::STOCKS_UPDATE,
            consts::ORDERS_CANCEL,
            consts::PAYMENTS_CREATE,
            consts::PAYMENT_METHODS_UPDATE,
            consts::PURCHASE_ORDERS_RECEIVE,
        ] {
            assert!(is_known_resource(split(permission).0), "{permission}");
        }
        assert!(is_known_resource("*"));
        assert!(!is_known_resource("warehouses"));
    }
}
