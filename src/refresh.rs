//! The refresh cycle that merges every source into the cache.
//!
//! A cycle loads the registry and the cached snapshot, then walks the sources:
//! batch sources are asked once for their whole group, sequential sources one
//! id at a time with a pause in between. The snapshot is persisted after every
//! merge so readers see progress while a long cycle is still running. Only
//! one cycle runs at a time; a request arriving while a recent cycle is in
//! flight is rejected rather than queued.

use crate::core::cache::{CacheEntry, CacheSnapshot, CacheStore};
use crate::core::config::ConfigProvider;
use crate::core::error::{EntryError, SourceError};
use crate::core::indicator::{Indicator, Registry, SourceKind};
use crate::core::observation::LatestReading;
use crate::core::source::{FetchMode, SourceClient, SourceSet, credential_for};
use anyhow::Context;
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Refresh already in progress")]
    AlreadyRunning,

    #[error("Refresh cycle failed: {0:#}")]
    Cycle(#[from] anyhow::Error),
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub updated: usize,
    pub failed: usize,
    pub pruned: usize,
    pub rate_limited: Vec<SourceKind>,
    pub unconfigured: Vec<SourceKind>,
}

#[derive(Debug, Default)]
struct CycleState {
    running: bool,
    started_at: Option<Instant>,
    generation: u64,
}

/// Marks the cycle as finished when dropped, including on panic.
struct CycleGuard<'a> {
    state: &'a Mutex<CycleState>,
    generation: u64,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer cycle may have taken over a stale flag; leave it alone.
        if state.generation == self.generation {
            state.running = false;
            state.started_at = None;
        }
    }
}

pub struct RefreshOrchestrator {
    sources: SourceSet,
    store: CacheStore,
    config: Arc<dyn ConfigProvider>,
    guard_window: Duration,
    state: Mutex<CycleState>,
}

impl RefreshOrchestrator {
    pub fn new(
        sources: SourceSet,
        store: CacheStore,
        config: Arc<dyn ConfigProvider>,
        guard_window: Duration,
    ) -> Self {
        Self {
            sources,
            store,
            config,
            guard_window,
            state: Mutex::new(CycleState::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Runs one cycle unless another started less than the guard window ago.
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let Some(_guard) = self.try_start() else {
            info!("Refresh already in progress, request rejected");
            return Err(RefreshError::AlreadyRunning);
        };

        match self.run_cycle().await {
            Ok(report) => {
                info!(
                    updated = report.updated,
                    failed = report.failed,
                    pruned = report.pruned,
                    "Refresh complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Refresh failed");
                Err(RefreshError::Cycle(e))
            }
        }
    }

    fn try_start(&self) -> Option<CycleGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if state.running {
            let started = state.started_at.unwrap_or(now);
            if now.duration_since(started) < self.guard_window {
                return None;
            }
            warn!(
                "Running flag is older than {:?}, starting a new cycle",
                self.guard_window
            );
        }
        state.generation += 1;
        state.running = true;
        state.started_at = Some(now);
        Some(CycleGuard {
            state: &self.state,
            generation: state.generation,
        })
    }

    #[instrument(name = "RefreshCycle", skip(self))]
    async fn run_cycle(&self) -> anyhow::Result<RefreshReport> {
        info!("Refreshing indicator data");
        let config = self
            .config
            .current()
            .await
            .context("Failed to load configuration")?;
        let registry = Registry::resolve(&config.series, &config.refresh.mandatory);
        let credentials = config.credentials.to_credentials();

        let mut cycle = Cycle {
            store: &self.store,
            snapshot: self.store.load().await?,
            retain_stale: config.refresh.retain_stale_on_error,
            report: RefreshReport::default(),
        };
        cycle.report.pruned = cycle.snapshot.retain_ids(&registry.ids());
        cycle.snapshot.notices.clear();

        for id in registry.unresolved() {
            warn!(id = %id, "No source recognises indicator id");
            cycle.record_error(id, None, EntryError::unknown_source());
        }
        cycle.persist().await?;

        // Batch sources first, they finish quickly and cover most ids.
        let mut kinds: Vec<(SourceKind, &Arc<dyn SourceClient>)> = SourceKind::all()
            .into_iter()
            .filter_map(|kind| self.sources.get(kind).map(|client| (kind, client)))
            .collect();
        kinds.sort_by_key(|(_, client)| !matches!(client.mode(), FetchMode::Batch));

        for kind in SourceKind::all() {
            if self.sources.get(kind).is_none() {
                let orphans = registry.for_source(kind);
                for indicator in &orphans {
                    cycle.record_error(
                        indicator.id(),
                        Some(kind),
                        EntryError::from(&SourceError::Network(format!(
                            "No client available for {kind}"
                        ))),
                    );
                }
                if !orphans.is_empty() {
                    cycle.persist().await?;
                }
            }
        }

        for (kind, client) in kinds {
            let indicators = registry.for_source(kind);
            if indicators.is_empty() {
                continue;
            }

            let Some(credential) = credential_for(client.as_ref(), &credentials) else {
                info!(source = %kind, "No credential configured, marking indicators");
                for indicator in &indicators {
                    cycle.record_error(
                        indicator.id(),
                        Some(kind),
                        EntryError::missing_credential(),
                    );
                }
                cycle.report.unconfigured.push(kind);
                cycle.persist().await?;
                continue;
            };

            match client.mode() {
                FetchMode::Batch => {
                    cycle
                        .refresh_batch(client.as_ref(), &indicators, credential)
                        .await?
                }
                FetchMode::Sequential { delay } => {
                    cycle
                        .refresh_sequential(client.as_ref(), &indicators, credential, delay)
                        .await?
                }
            }
        }

        Ok(cycle.report)
    }
}

/// Mutable state of one running cycle.
struct Cycle<'a> {
    store: &'a CacheStore,
    snapshot: CacheSnapshot,
    retain_stale: bool,
    report: RefreshReport,
}

impl Cycle<'_> {
    /// Writes the whole snapshot with a fresh timestamp.
    async fn persist(&mut self) -> anyhow::Result<()> {
        self.snapshot.last_refresh = Some(Utc::now());
        self.store.save(&self.snapshot).await
    }

    fn record_reading(&mut self, indicator: &Indicator, reading: LatestReading) {
        let entry = CacheEntry::from_reading(
            indicator.id(),
            indicator.source,
            reading,
            self.snapshot.get(indicator.id()),
            Utc::now(),
        );
        self.snapshot.merge(entry);
        self.report.updated += 1;
    }

    fn record_error(&mut self, id: &str, source: Option<SourceKind>, error: EntryError) {
        debug!(id, error = %error.message, "Recording failure");
        let entry = CacheEntry::from_error(
            id,
            source,
            error,
            self.snapshot.get(id),
            self.retain_stale,
            Utc::now(),
        );
        self.snapshot.merge(entry);
        self.report.failed += 1;
    }

    fn record_result(
        &mut self,
        indicator: &Indicator,
        result: Option<Result<LatestReading, SourceError>>,
    ) {
        match result {
            Some(Ok(reading)) => self.record_reading(indicator, reading),
            Some(Err(e)) => {
                warn!(id = indicator.id(), error = %e, "Fetch failed");
                self.record_error(indicator.id(), Some(indicator.source), EntryError::from(&e));
            }
            None => self.record_error(
                indicator.id(),
                Some(indicator.source),
                EntryError::from(&SourceError::NotFound(format!(
                    "No data returned for {}",
                    indicator.id()
                ))),
            ),
        }
    }

    fn note_rate_limit(&mut self, kind: SourceKind) {
        if !self.report.rate_limited.contains(&kind) {
            self.report.rate_limited.push(kind);
            self.snapshot.notices.push(format!(
                "{kind} rate limit reached, remaining indicators skipped until the next refresh"
            ));
        }
    }

    async fn refresh_batch(
        &mut self,
        client: &dyn SourceClient,
        indicators: &[Indicator],
        credential: Option<&str>,
    ) -> anyhow::Result<()> {
        let kind = client.kind();
        debug!(source = %kind, count = indicators.len(), "Fetching batch");
        let mut results = client.fetch_latest(indicators, credential).await;
        for indicator in indicators {
            let result = results.remove(indicator.id());
            if matches!(&result, Some(Err(e)) if e.is_rate_limited()) {
                self.note_rate_limit(kind);
            }
            self.record_result(indicator, result);
        }
        self.persist().await
    }

    async fn refresh_sequential(
        &mut self,
        client: &dyn SourceClient,
        indicators: &[Indicator],
        credential: Option<&str>,
        delay: Duration,
    ) -> anyhow::Result<()> {
        let kind = client.kind();
        for (position, indicator) in indicators.iter().enumerate() {
            let mut results = client
                .fetch_latest(std::slice::from_ref(indicator), credential)
                .await;
            let result = results.remove(indicator.id());
            let rate_limited = matches!(&result, Some(Err(e)) if e.is_rate_limited());
            self.record_result(indicator, result);
            self.persist().await?;

            if rate_limited {
                let skipped = &indicators[position + 1..];
                warn!(source = %kind, skipped = skipped.len(), "Rate limited, stopping source");
                self.note_rate_limit(kind);
                for rest in skipped {
                    self.record_error(
                        rest.id(),
                        Some(kind),
                        EntryError::skipped_after_rate_limit(kind),
                    );
                }
                self.persist().await?;
                break;
            }

            if position + 1 < indicators.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }
}
