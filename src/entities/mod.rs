//! sea-orm entities. Every business table carries the same envelope: an
//! internal `id`, an external `uuid`, timestamps, a soft-delete marker and
//! the acting user for each write.

pub mod gateway_account;
pub mod gateway_log;
pub mod order;
pub mod order_line;
pub mod order_line_add_on;
pub mod order_payment;
pub mod outlet;
pub mod payment_method;
pub mod product;
pub mod product_add_on;
pub mod product_variant;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod recipe;
pub mod stock;
pub mod stock_movement;
pub mod supplier;
pub mod user;
pub mod user_payment_method;
