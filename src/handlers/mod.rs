pub mod auth;
pub mod catalog;
pub mod common;
pub mod health;
pub mod orders;
pub mod payment_callbacks;
pub mod payments;
pub mod purchase_orders;
pub mod reports;

use std::sync::Arc;

use crate::{
    auth::AuthService,
    db::DbPool,
    services::{
        catalog::CatalogService,
        gateway::GatewayRegistry,
        notifications::EmailQueue,
        orders::OrderService,
        payments::{PaymentService, PaymentUrls},
        purchase_orders::PurchaseOrderService,
        recipes::RecipeService,
        reports::ReportService,
        stock_ledger::{SeaOrmStockLedger, StockLedger},
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub catalog: Arc<CatalogService>,
    pub recipes: Arc<RecipeService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub reports: Arc<ReportService>,
    pub email: EmailQueue,
}

impl AppServices {
    /// Wires every service over one pool and one stock ledger.
    pub fn new(
        db_pool: Arc<DbPool>,
        auth: Arc<AuthService>,
        gateways: Arc<GatewayRegistry>,
        urls: PaymentUrls,
        email: EmailQueue,
    ) -> Self {
        let ledger: Arc<dyn StockLedger> = Arc::new(SeaOrmStockLedger::new(db_pool.clone()));

        Self {
            auth,
            catalog: Arc::new(CatalogService::new(db_pool.clone(), ledger.clone())),
            recipes: Arc::new(RecipeService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), ledger.clone())),
            payments: Arc::new(PaymentService::new(db_pool.clone(), gateways, urls)),
            purchase_orders: Arc::new(PurchaseOrderService::new(db_pool.clone(), ledger)),
            reports: Arc::new(ReportService::new(db_pool)),
            email,
        }
    }
}
