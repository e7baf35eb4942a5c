//! Source client abstraction

use crate::core::error::SourceError;
use crate::core::indicator::{Indicator, SourceKind};
use crate::core::observation::{DateRange, LatestReading, Observation};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-id outcome of a latest-value fetch, keyed by the full indicator id.
pub type LatestResults = HashMap<String, Result<LatestReading, SourceError>>;

/// How the orchestrator should drive a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// One call covers the whole group.
    Batch,
    /// One id per call with a pause between calls.
    Sequential { delay: Duration },
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn mode(&self) -> FetchMode;

    /// Whether the provider refuses requests without a credential.
    fn requires_credential(&self) -> bool {
        true
    }

    /// Fetches the latest valid reading for each indicator. Ids the provider
    /// never answered for are absent from the result.
    async fn fetch_latest(&self, indicators: &[Indicator], credential: Option<&str>)
    -> LatestResults;

    /// Fetches an ordered (oldest first) series. `None` uses the provider's
    /// default window.
    async fn fetch_historical(
        &self,
        indicator: &Indicator,
        range: Option<DateRange>,
        credential: Option<&str>,
    ) -> Result<Vec<Observation>, SourceError>;
}

/// The configured clients, one per source.
#[derive(Clone, Default)]
pub struct SourceSet {
    clients: HashMap<SourceKind, Arc<dyn SourceClient>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, client: Arc<dyn SourceClient>) -> Self {
        self.clients.insert(client.kind(), client);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn SourceClient>> {
        self.clients.get(&kind)
    }
}

/// Credentials per source, read from configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    values: HashMap<SourceKind, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SourceKind, credential: &str) -> Self {
        self.set(kind, credential);
        self
    }

    /// Blank strings count as not configured.
    pub fn set(&mut self, kind: SourceKind, credential: &str) {
        let trimmed = credential.trim();
        if trimmed.is_empty() {
            self.values.remove(&kind);
        } else {
            self.values.insert(kind, trimmed.to_string());
        }
    }

    pub fn get(&self, kind: SourceKind) -> Option<&str> {
        self.values.get(&kind).map(String::as_str)
    }
}

/// Resolves the credential a client should use, or `None` if the source is
/// not configured.
pub fn credential_for<'a>(
    client: &dyn SourceClient,
    credentials: &'a Credentials,
) -> Option<Option<&'a str>> {
    match credentials.get(client.kind()) {
        Some(value) => Some(Some(value)),
        None if !client.requires_credential() => Some(None),
        None => None,
    }
}
