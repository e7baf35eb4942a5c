use crate::core::error::EntryError;
use crate::core::indicator::SourceKind;
use crate::core::observation::{LatestReading, Observation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

const ENTRIES_KEY: &str = "entries";
const LAST_REFRESH_KEY: &str = "last_refresh";
const NOTICES_KEY: &str = "notices";
const BASELINE_KEY_PREFIX: &str = "baseline:";

/// Raw byte-level storage the cache is persisted into.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes every pair or none of them.
    async fn put_many(&self, items: Vec<(String, Vec<u8>)>) -> Result<()>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.put_many(vec![(key.to_string(), value)]).await
    }
}

/// Cached state of one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub source: Option<SourceKind>,
    pub title: Option<String>,
    pub value: Option<String>,
    pub date: Option<String>,
    pub previous_value: Option<String>,
    pub previous_date: Option<String>,
    pub variation: Option<f64>,
    pub error: Option<EntryError>,
    /// The value predates the recorded error.
    #[serde(default)]
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry for a successful fetch. `prior` is the entry from the previous
    /// cycle; its value becomes the previous value when the date moved on.
    pub fn from_reading(
        id: &str,
        source: SourceKind,
        reading: LatestReading,
        prior: Option<&CacheEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        let (previous_value, previous_date) = match prior {
            Some(old) if old.value.is_some() && old.date.as_ref() != Some(&reading.latest.date) => {
                (old.value.clone(), old.date.clone())
            }
            Some(old) if old.value.is_some() => {
                (old.previous_value.clone(), old.previous_date.clone())
            }
            _ => match &reading.previous {
                Some(Observation { date, value }) => (Some(value.clone()), Some(date.clone())),
                None => (None, None),
            },
        };

        CacheEntry {
            id: id.to_string(),
            source: Some(source),
            title: reading.title.or_else(|| prior.and_then(|p| p.title.clone())),
            value: Some(reading.latest.value),
            date: Some(reading.latest.date),
            previous_value,
            previous_date,
            variation: reading.variation,
            error: None,
            stale: false,
            updated_at: now,
        }
    }

    /// Entry for a failed fetch. With `retain_stale` the last good value is
    /// kept and flagged stale; otherwise the entry carries only the error.
    pub fn from_error(
        id: &str,
        source: Option<SourceKind>,
        error: EntryError,
        prior: Option<&CacheEntry>,
        retain_stale: bool,
        now: DateTime<Utc>,
    ) -> Self {
        match prior {
            Some(old) if retain_stale && old.value.is_some() => CacheEntry {
                error: Some(error),
                stale: true,
                source: source.or(old.source),
                updated_at: now,
                ..old.clone()
            },
            _ => CacheEntry {
                id: id.to_string(),
                source,
                title: prior.and_then(|p| p.title.clone()),
                value: None,
                date: None,
                previous_value: None,
                previous_date: None,
                variation: None,
                error: Some(error),
                stale: false,
                updated_at: now,
            },
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        self.value
            .as_deref()
            .and_then(crate::core::observation::parse_value)
    }
}

/// Everything the presentation layer reads from the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: BTreeMap<String, CacheEntry>,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Cycle-wide notices such as rate limits, replaced every cycle.
    pub notices: Vec<String>,
}

impl CacheSnapshot {
    pub fn get(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    pub fn merge(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Drops entries whose id is not in `keep`. Returns how many were dropped.
    pub fn retain_ids(&mut self, keep: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| keep.contains(id));
        before - self.entries.len()
    }
}

/// A value remembered between volatility polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub value: f64,
    pub date: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Typed access to the persisted cache.
#[derive(Clone)]
pub struct CacheStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl CacheStore {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    pub async fn load(&self) -> Result<CacheSnapshot> {
        let entries = self
            .read_json::<BTreeMap<String, CacheEntry>>(ENTRIES_KEY)
            .await?
            .unwrap_or_default();
        let last_refresh = self.read_json(LAST_REFRESH_KEY).await?;
        let notices = self.read_json(NOTICES_KEY).await?.unwrap_or_default();
        debug!(entries = entries.len(), "Loaded cache snapshot");
        Ok(CacheSnapshot {
            entries,
            last_refresh,
            notices,
        })
    }

    /// Persists the whole snapshot in one atomic write.
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let items = vec![
            (
                ENTRIES_KEY.to_string(),
                serde_json::to_vec(&snapshot.entries).context("Failed to encode cache entries")?,
            ),
            (
                LAST_REFRESH_KEY.to_string(),
                serde_json::to_vec(&snapshot.last_refresh)?,
            ),
            (NOTICES_KEY.to_string(), serde_json::to_vec(&snapshot.notices)?),
        ];
        self.collection
            .put_many(items)
            .await
            .context("Failed to persist cache snapshot")?;
        debug!(entries = snapshot.entries.len(), "Persisted cache snapshot");
        Ok(())
    }

    pub async fn baseline(&self, id: &str) -> Result<Option<Baseline>> {
        self.read_json(&format!("{BASELINE_KEY_PREFIX}{id}")).await
    }

    pub async fn set_baseline(&self, id: &str, baseline: &Baseline) -> Result<()> {
        self.collection
            .put(
                &format!("{BASELINE_KEY_PREFIX}{id}"),
                serde_json::to_vec(baseline)?,
            )
            .await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.collection.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to decode cached value for key: {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}
