use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

/// Collection backed by a fjall partition. Every write is committed as one
/// batch and synced before returning.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let partition = keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .with_context(|| format!("Failed to open partition: {name}"))?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .partition
            .get(key.as_bytes())
            .with_context(|| format!("Failed to read key: {key}"))?;
        if value.is_some() {
            debug!("Cache HIT for key: {}", key);
        } else {
            debug!("Cache MISS for key: {}", key);
        }
        Ok(value.map(|v| v.to_vec()))
    }

    async fn put_many(&self, items: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        for (key, value) in items {
            debug!("Cache PUT for key: {}", key);
            batch.insert(&self.partition, key.as_bytes(), value);
        }
        batch.commit().context("Failed to commit cache batch")?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to sync cache to disk")?;
        Ok(())
    }
}
