pub mod disk;
pub mod memory;

use crate::core::cache::KeyValueCollection;
use disk::DiskCollection;
use memory::MemoryCollection;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const CACHE_PARTITION: &str = "cache";

/// Opens the persistent cache collection under `data_path`, falling back to
/// memory when there is no usable data directory.
pub fn open_collection(data_path: Option<&Path>) -> Arc<dyn KeyValueCollection> {
    let Some(path) = data_path else {
        warn!("No data directory available, cache will not survive restarts");
        return Arc::new(MemoryCollection::new());
    };

    match DiskCollection::open(&path.join("cache"), CACHE_PARTITION) {
        Ok(collection) => Arc::new(collection),
        Err(e) => {
            warn!(
                "Failed to open cache at {}: {:#}. Using in-memory cache",
                path.display(),
                e
            );
            Arc::new(MemoryCollection::new())
        }
    }
}
