//! PostgreSQL adapters.
//!
//! - `PostgresPaymentStore` - Payment records and guarded transitions
//! - `PostgresOrderRepository` - Storefront orders, payment-status projection only
//! - `PostgresUserDirectory` - Customer contact details

mod order_repository;
mod payment_store;
mod user_directory;

pub use order_repository::PostgresOrderRepository;
pub use payment_store::PostgresPaymentStore;
pub use user_directory::PostgresUserDirectory;
