use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection, used for tests and when no data directory exists.
#[derive(Clone, Default)]
pub struct MemoryCollection {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cache = self.inner.lock().await;
        let value = cache.get(key).cloned();
        if value.is_some() {
            debug!("Cache HIT for key: {}", key);
        } else {
            debug!("Cache MISS for key: {}", key);
        }
        Ok(value)
    }

    async fn put_many(&self, items: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut cache = self.inner.lock().await;
        for (key, value) in items {
            debug!("Cache PUT for key: {}", key);
            cache.insert(key, value);
        }
        Ok(())
    }
}
