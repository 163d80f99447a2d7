use std::path::PathBuf;
use std::sync::Arc;

use pinhole_core::{Result, Storage};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::filelog::FileLogStorage;
use crate::memory::InMemoryStorage;
use crate::postgres::PostgresStorage;

/// Engine selection for one process, decided once at startup.
///
/// Postgres wins when a DSN is configured, the file log comes next, and
/// the volatile in-memory engine is the fallback. Nothing here is global
/// or mutable after [`init`] has run.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageConfig {
    /// Postgres DSN; takes precedence over `file_path`.
    #[builder(default, setter(strip_option, into))]
    pub database_url: Option<String>,
    /// Path of the append-only record log.
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
}

/// Builds the configured engine behind the uniform contract.
pub async fn init(config: StorageConfig) -> Result<Arc<dyn Storage>> {
    if let Some(url) = &config.database_url {
        let storage = PostgresStorage::connect(url).await?;
        info!("storage: postgres");
        return Ok(Arc::new(storage));
    }

    if let Some(path) = &config.file_path {
        let storage = FileLogStorage::open(path.clone()).await?;
        info!(path = %path.display(), "storage: file log");
        return Ok(Arc::new(storage));
    }

    info!("storage: in-memory");
    Ok(Arc::new(InMemoryStorage::new()))
}
