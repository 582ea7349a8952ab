pub mod pool;
pub mod queries;
pub mod queries_stock;

pub use pool::{create_pool, run_migrations};
