//! Kasir API Library
//!
//! Multi-tenant point-of-sale backend: catalog, stock ledger, orders,
//! payments with gateway callbacks, purchase orders and reporting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod i18n;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::db::DbPool;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

pub fn api_v1_routes() -> Router<AppState> {
    // Catalog routes with permission gating
    let outlets_read = Router::new()
        .route("/outlets", get(handlers::catalog::list_outlets))
        .with_permission(perm::OUTLETS_READ);

    let outlets_create = Router::new()
        .route("/outlets", post(handlers::catalog::create_outlet))
        .with_permission(perm::OUTLETS_CREATE);

    let products_read = Router::new()
        .route("/products", get(handlers::catalog::list_products))
        .with_permission(perm::PRODUCTS_READ);

    let products_create = Router::new()
        .route("/products", post(handlers::catalog::create_product))
        .with_permission(perm::PRODUCTS_CREATE);

    let products_update = Router::new()
        .route(
            "/products/:id/variants",
            post(handlers::catalog::create_variant),
        )
        .route("/products/:id/add-ons", post(handlers::catalog::bind_add_on))
        .with_permission(perm::PRODUCTS_UPDATE);

    let products_delete = Router::new()
        .route(
            "/products/:id",
            axum::routing::delete(handlers::catalog::delete_product),
        )
        .with_permission(perm::PRODUCTS_DELETE);

    let recipes_read = Router::new()
        .route("/products/:id/recipe", get(handlers::catalog::get_recipe))
        .with_permission(perm::RECIPES_READ);

    let recipes_update = Router::new()
        .route("/products/:id/recipe", put(handlers::catalog::replace_recipe))
        .with_permission(perm::RECIPES_UPDATE);

    // Stock routes
    let stocks_read = Router::new()
        .route("/outlets/:id/stocks", get(handlers::catalog::list_stock))
        .route(
            "/outlets/:id/stock-movements",
            get(handlers::reports::stock_movements),
        )
        .with_permission(perm::STOCKS_READ);

    let stocks_update = Router::new()
        .route("/outlets/:id/stocks", put(handlers::catalog::set_stock))
        .with_permission(perm::STOCKS_UPDATE);

    // Orders routes with permission gating
    let orders_read = Router::new()
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/outlets/:id/orders",
            get(handlers::orders::list_outlet_orders),
        )
        .with_permission(perm::ORDERS_READ);

    let orders_create = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .with_permission(perm::ORDERS_CREATE);

    let orders_cancel = Router::new()
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .with_permission(perm::ORDERS_CANCEL);

    // Payments routes
    let payments_read = Router::new()
        .route(
            "/orders/:id/payments",
            get(handlers::payments::list_order_payments),
        )
        .with_permission(perm::PAYMENTS_READ);

    let payments_create = Router::new()
        .route("/order-payments", post(handlers::payments::create_payment))
        .with_permission(perm::PAYMENTS_CREATE);

    let payment_methods_read = Router::new()
        .route(
            "/payment-methods",
            get(handlers::payments::list_payment_methods),
        )
        .with_permission(perm::PAYMENT_METHODS_READ);

    let payment_methods_update = Router::new()
        .route(
            "/payment-methods/:id/activate",
            post(handlers::payments::activate_payment_method),
        )
        .route(
            "/payment-gateways/:issuer/register",
            post(handlers::payments::register_gateway_account),
        )
        .with_permission(perm::PAYMENT_METHODS_UPDATE);

    // Issuer callbacks (no auth, signature-verified)
    let payment_callbacks = Router::new().route(
        "/api/payment/:issuer/notify",
        post(handlers::payment_callbacks::gateway_notify),
    );

    // Procurement routes
    let suppliers_create = Router::new()
        .route("/suppliers", post(handlers::purchase_orders::create_supplier))
        .with_permission(perm::SUPPLIERS_CREATE);

    let purchase_orders_read = Router::new()
        .route(
            "/purchase-orders",
            get(handlers::purchase_orders::list_purchase_orders),
        )
        .route(
            "/purchase-orders/:id",
            get(handlers::purchase_orders::get_purchase_order),
        )
        .with_permission(perm::PURCHASE_ORDERS_READ);

    let purchase_orders_create = Router::new()
        .route(
            "/purchase-orders",
            post(handlers::purchase_orders::create_purchase_order),
        )
        .with_permission(perm::PURCHASE_ORDERS_CREATE);

    let purchase_orders_receive = Router::new()
        .route(
            "/purchase-orders/:id/receive",
            put(handlers::purchase_orders::receive_purchase_order),
        )
        .with_permission(perm::PURCHASE_ORDERS_RECEIVE);

    let purchase_orders_cancel = Router::new()
        .route(
            "/purchase-orders/:id/cancel",
            post(handlers::purchase_orders::cancel_purchase_order),
        )
        .with_permission(perm::PURCHASE_ORDERS_CANCEL);

    // Reports
    let reports = Router::new()
        .route(
            "/reports/outlets/:id/sales",
            get(handlers::reports::sales_by_outlet),
        )
        .route(
            "/reports/products/:id/sales",
            get(handlers::reports::sales_by_product),
        )
        .route(
            "/reports/outlets/:id/stocks",
            get(handlers::reports::stock_by_outlet),
        )
        .with_permission(perm::REPORTS_READ);

    // Accounts
    let staff = Router::new()
        .route("/staff", post(handlers::auth::create_staff))
        .with_permission(perm::STAFF_CREATE);

    let otp = Router::new()
        .route("/auth/otp", post(handlers::auth::request_otp))
        .with_permission(perm::OTP_CREATE);

    Router::new()
        // Health and public auth endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .merge(otp)
        .merge(staff)
        // Catalog API (auth + permissions)
        .merge(outlets_read)
        .merge(outlets_create)
        .merge(products_read)
        .merge(products_create)
        .merge(products_update)
        .merge(products_delete)
        .merge(recipes_read)
        .merge(recipes_update)
        .merge(stocks_read)
        .merge(stocks_update)
        // Orders API
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_cancel)
        // Payments API
        .merge(payments_read)
        .merge(payments_create)
        .merge(payment_methods_read)
        .merge(payment_methods_update)
        .merge(payment_callbacks)
        // Procurement
        .merge(suppliers_create)
        .merge(purchase_orders_read)
        .merge(purchase_orders_create)
        .merge(purchase_orders_receive)
        .merge(purchase_orders_cancel)
        // Reporting
        .merge(reports)
}

/// Builds the CORS layer from a comma-separated origin list; permissive
/// when none is configured.
pub fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect()
        })
        .unwrap_or_default();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// The full HTTP application with every middleware applied.
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.services.auth.clone();
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    let cors = cors_layer(state.config.cors_allowed_origins.as_deref());

    api_v1_routes()
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(i18n::locale_middleware))
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            crate::tracing::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_falls_back_to_permissive() {
        // Both branches must build without panicking on odd input.
        let _ = cors_layer(None);
        let _ = cors_layer(Some(" , "));
        let _ = cors_layer(Some("https://kasir.example, https://admin.kasir.example"));
    }
}
