use nb_core::{Error, Result, Store};
use std::sync::Arc;
use tracing::info;

pub mod backends;

pub use backends::*;

/// Opens the record store named by `spec`: `memory`, or a SQLite location
/// given as `sqlite:<path>`, `sqlite://<path>` or a bare path.
pub async fn create_store(spec: &str) -> Result<Arc<dyn Store>> {
    if spec.is_empty() || spec == "memory" {
        info!("💾 Using in-memory storage");
        return Ok(Arc::new(MemoryStore::new()));
    }
    open_sqlite(spec).await
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(spec: &str) -> Result<Arc<dyn Store>> {
    let path = spec
        .strip_prefix("sqlite://")
        .or_else(|| spec.strip_prefix("sqlite:"))
        .unwrap_or(spec);
    if path.is_empty() {
        return Err(Error::Config(format!("Invalid storage location: {}", spec)));
    }
    let store = SQLiteStore::new_with_path(std::path::Path::new(path)).await?;
    info!("💾 Using SQLite storage at {}", store.get_db_path().display());
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(spec: &str) -> Result<Arc<dyn Store>> {
    Err(Error::Config(format!(
        "Storage '{}' needs the sqlite feature of nb_storage",
        spec
    )))
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::create_store;
}
