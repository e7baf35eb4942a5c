//! Timer-driven triggers for the refresh cycle and the volatility poll.

use crate::refresh::{RefreshError, RefreshOrchestrator};
use crate::volatility::VolatilityMonitor;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub refresh_every: Duration,
    /// `None` disables the volatility poll.
    pub volatility_every: Option<Duration>,
}

/// Runs both schedulers until Ctrl-C.
pub async fn run(
    orchestrator: Arc<RefreshOrchestrator>,
    monitor: Arc<VolatilityMonitor>,
    schedule: Schedule,
) -> Result<()> {
    run_until(orchestrator, monitor, schedule, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
        }
    })
    .await
}

/// Runs both schedulers until `shutdown` resolves. The first refresh starts
/// immediately.
pub async fn run_until(
    orchestrator: Arc<RefreshOrchestrator>,
    monitor: Arc<VolatilityMonitor>,
    schedule: Schedule,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    info!(?schedule, "Starting schedulers");
    let refresh = tokio::spawn(refresh_loop(orchestrator, schedule.refresh_every));
    let volatility = schedule
        .volatility_every
        .map(|every| tokio::spawn(volatility_loop(monitor, every)));

    shutdown.await;
    info!("Shutting down schedulers");
    refresh.abort();
    if let Some(volatility) = volatility {
        volatility.abort();
    }
    Ok(())
}

async fn refresh_loop(orchestrator: Arc<RefreshOrchestrator>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        match orchestrator.refresh().await {
            Ok(report) => debug!(?report, "Scheduled refresh finished"),
            Err(RefreshError::AlreadyRunning) => debug!("Scheduled refresh skipped"),
            // Cycle failures never stop the timer.
            Err(e) => warn!(error = %e, "Scheduled refresh failed"),
        }
    }
}

async fn volatility_loop(monitor: Arc<VolatilityMonitor>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Err(e) = monitor.check().await {
            warn!(error = %e, "Volatility check failed");
        }
    }
}
