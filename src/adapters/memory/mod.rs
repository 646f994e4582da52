//! In-memory adapters for tests and local development.

mod order_repository;
mod payment_store;
mod user_directory;

pub use order_repository::InMemoryOrderRepository;
pub use payment_store::InMemoryPaymentStore;
pub use user_directory::InMemoryUserDirectory;
