//! Watches one exchange-rate indicator for sharp moves between polls.

use crate::core::cache::{Baseline, CacheStore};
use crate::core::config::ConfigProvider;
use crate::core::indicator::{Indicator, IndicatorDescriptor, Periodicity, SourceKind, ValueKind};
use crate::core::observation::percent_change;
use crate::core::source::{SourceSet, credential_for};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Absorbs float error in the percent change, so a move of exactly the
/// threshold still alerts.
const THRESHOLD_TOLERANCE: f64 = 1e-9;

fn crosses_threshold(change: f64, threshold: f64) -> bool {
    change.abs() + THRESHOLD_TOLERANCE >= threshold
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Delivers volatility alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Emits alerts as warnings in the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        warn!(title = %notification.title, "{}", notification.message);
        Ok(())
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityCheck {
    pub indicator: String,
    pub previous: Option<f64>,
    pub current: f64,
    pub variation: Option<f64>,
    pub notified: bool,
}

pub struct VolatilityMonitor {
    sources: SourceSet,
    store: CacheStore,
    config: Arc<dyn ConfigProvider>,
    notifier: Arc<dyn Notifier>,
}

impl VolatilityMonitor {
    pub fn new(
        sources: SourceSet,
        store: CacheStore,
        config: Arc<dyn ConfigProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sources,
            store,
            config,
            notifier,
        }
    }

    /// Fetches the watched indicator, compares it with the stored baseline
    /// and stores the new value as the next baseline.
    #[instrument(name = "VolatilityCheck", skip(self))]
    pub async fn check(&self) -> Result<VolatilityCheck> {
        let config = self.config.current().await.context("Failed to load configuration")?;
        let settings = &config.volatility;
        let id = settings.indicator.as_str();

        let source = SourceKind::from_id(id)
            .ok_or_else(|| anyhow!("Unrecognized indicator id: {id}"))?;
        let client = self
            .sources
            .get(source)
            .ok_or_else(|| anyhow!("No client available for {source}"))?;
        let credentials = config.credentials.to_credentials();
        let credential = credential_for(client.as_ref(), &credentials)
            .ok_or_else(|| anyhow!("Missing credential for {source}"))?;

        let descriptor = config
            .series
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .unwrap_or_else(|| {
                IndicatorDescriptor::new(id, id, ValueKind::Currency, Periodicity::Daily)
            });
        let title = if descriptor.title.is_empty() {
            id.to_string()
        } else {
            descriptor.title.clone()
        };
        let indicator = Indicator { source, descriptor };

        let mut results = client
            .fetch_latest(std::slice::from_ref(&indicator), credential)
            .await;
        let reading = results
            .remove(id)
            .ok_or_else(|| anyhow!("No data returned for {id}"))?
            .with_context(|| format!("Failed to fetch {id}"))?;
        let current = reading
            .latest
            .numeric()
            .ok_or_else(|| anyhow!("Value '{}' for {id} is not numeric", reading.latest.value))?;

        let previous = self.store.baseline(id).await?.map(|b| b.value);
        let variation = previous.and_then(|p| percent_change(current, p));
        debug!(?previous, current, ?variation, "Compared with baseline");

        self.store
            .set_baseline(
                id,
                &Baseline {
                    value: current,
                    date: Some(reading.latest.date),
                    observed_at: Utc::now(),
                },
            )
            .await?;

        let threshold = settings.threshold_percent;
        let notified = match (previous, variation) {
            (Some(previous), Some(change)) if crosses_threshold(change, threshold) => {
                info!(change, threshold, "Variation over threshold");
                self.notifier
                    .notify(Notification {
                        title: format!("Volatility alert: {title}"),
                        message: format!(
                            "{title} moved {change:+.2}% ({previous:.4} -> {current:.4})"
                        ),
                    })
                    .await
                    .context("Failed to deliver volatility alert")?;
                true
            }
            _ => false,
        };

        Ok(VolatilityCheck {
            indicator: id.to_string(),
            previous,
            current,
            variation,
            notified,
        })
    }
}
