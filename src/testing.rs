//! In-process fakes shared by the unit tests.

use crate::core::config::AppConfig;
use crate::core::error::SourceError;
use crate::core::indicator::{Indicator, IndicatorDescriptor, Periodicity, SourceKind, ValueKind};
use crate::core::observation::{DateRange, LatestReading, Observation};
use crate::core::source::{FetchMode, LatestResults, SourceClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

struct Gate {
    id: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// A scripted source. Every requested id is recorded; ids without a scripted
/// response are left out of the result.
pub struct FakeSource {
    kind: SourceKind,
    mode: FetchMode,
    pub requires_credential: bool,
    responses: Mutex<HashMap<String, Result<LatestReading, SourceError>>>,
    historical: Mutex<HashMap<String, Result<Vec<Observation>, SourceError>>>,
    calls: Mutex<Vec<String>>,
    credentials_seen: Mutex<Vec<Option<String>>>,
    gate: Mutex<Option<Gate>>,
}

impl FakeSource {
    pub fn new(kind: SourceKind, mode: FetchMode) -> Self {
        Self {
            kind,
            mode,
            requires_credential: true,
            responses: Mutex::new(HashMap::new()),
            historical: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            credentials_seen: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn sequential(kind: SourceKind) -> Self {
        Self::new(
            kind,
            FetchMode::Sequential {
                delay: Duration::from_secs(2),
            },
        )
    }

    pub fn ok(self, id: &str, value: &str) -> Self {
        self.set(id, Ok(reading(value)));
        self
    }

    pub fn err(self, id: &str, error: SourceError) -> Self {
        self.set(id, Err(error));
        self
    }

    pub fn history(self, id: &str, result: Result<Vec<Observation>, SourceError>) -> Self {
        self.historical.lock().unwrap().insert(id.to_string(), result);
        self
    }

    /// Blocks the first fetch of `id`: notifies `entered`, then waits for
    /// `release`.
    pub fn gated(self, id: &str, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        *self.gate.lock().unwrap() = Some(Gate {
            id: id.to_string(),
            entered,
            release,
        });
        self
    }

    pub fn set(&self, id: &str, result: Result<LatestReading, SourceError>) {
        self.responses.lock().unwrap().insert(id.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        self.credentials_seen.lock().unwrap().clone()
    }

    fn take_gate(&self, id: &str) -> Option<Gate> {
        let mut gate = self.gate.lock().unwrap();
        match gate.as_ref() {
            Some(g) if g.id == id => gate.take(),
            _ => None,
        }
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn mode(&self) -> FetchMode {
        self.mode
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    async fn fetch_latest(
        &self,
        indicators: &[Indicator],
        credential: Option<&str>,
    ) -> LatestResults {
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credential.map(str::to_string));
        let mut results = LatestResults::new();
        for indicator in indicators {
            self.calls.lock().unwrap().push(indicator.id().to_string());
            if let Some(gate) = self.take_gate(indicator.id()) {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            let response = self.responses.lock().unwrap().get(indicator.id()).cloned();
            if let Some(response) = response {
                results.insert(indicator.id().to_string(), response);
            }
        }
        results
    }

    async fn fetch_historical(
        &self,
        indicator: &Indicator,
        _range: Option<DateRange>,
        credential: Option<&str>,
    ) -> Result<Vec<Observation>, SourceError> {
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credential.map(str::to_string));
        self.historical
            .lock()
            .unwrap()
            .get(indicator.id())
            .cloned()
            .unwrap_or_else(|| Err(SourceError::NotFound(indicator.id().to_string())))
    }
}

pub fn reading(value: &str) -> LatestReading {
    LatestReading {
        latest: Observation::new("15/10/2024", value),
        previous: None,
        variation: None,
        title: None,
    }
}

/// A configuration with the given series, no mandatory ids and the given
/// credentials.
pub fn config(ids: &[&str], credentials: &[(SourceKind, &str)]) -> AppConfig {
    let mut config = AppConfig::default();
    config.series = ids
        .iter()
        .map(|id| IndicatorDescriptor::new(id, id, ValueKind::Number, Periodicity::Daily))
        .collect();
    config.refresh.mandatory = Vec::new();
    for (kind, value) in credentials {
        let slot = match kind {
            SourceKind::Banxico => &mut config.credentials.banxico,
            SourceKind::Yahoo => &mut config.credentials.yahoo,
            SourceKind::Inegi => &mut config.credentials.inegi,
        };
        *slot = Some(value.to_string());
    }
    config
}
