// Tenancy and inventory
pub mod recipes;
pub mod stock_ledger;
pub mod tenancy;

// Sales
pub mod orders;
pub mod payments;

// Payment gateways
pub mod gateway;

// Procurement
pub mod purchase_orders;

// Catalog and reporting
pub mod catalog;
pub mod reports;

// Outbound email
pub mod notifications;
