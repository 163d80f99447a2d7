pub mod config;
pub mod filelog;
pub mod memory;
pub mod postgres;

pub use config::{init, StorageConfig};
pub use filelog::FileLogStorage;
pub use memory::InMemoryStorage;
pub use pinhole_core::{Storage, StorageError};
pub use postgres::PostgresStorage;
