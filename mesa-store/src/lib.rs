pub mod app_config;
pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;
