pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryStore, MemoryUnitOfWork};

#[cfg(feature = "sqlite")]
pub use sqlite::{SQLiteStore, SQLiteUnitOfWork};
