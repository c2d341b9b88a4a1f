pub mod memory;
pub mod postgres;

pub use memory::MemoryFactStore;
pub use postgres::PgFactStore;
