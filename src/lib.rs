pub mod cli;
pub mod core;
pub mod providers;
pub mod refresh;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod volatility;

#[cfg(test)]
mod testing;

use crate::cli::calc::CalcCommand;
use crate::core::cache::CacheStore;
use crate::core::config::{AppConfig, ConfigFile, ConfigProvider};
use crate::core::indicator::Registry;
use crate::core::observation::DateRange;
use crate::core::source::SourceSet;
use crate::refresh::RefreshOrchestrator;
use crate::scheduler::Schedule;
use crate::service::CommandService;
use crate::volatility::{LogNotifier, VolatilityMonitor};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Refresh,
    Show,
    History {
        ids: Vec<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    Calc(CalcCommand),
    Watch,
    CheckVolatility,
}

/// Everything a command needs, wired from one configuration file.
pub struct App {
    pub config: AppConfig,
    pub store: CacheStore,
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub service: CommandService,
    pub monitor: Arc<VolatilityMonitor>,
}

impl App {
    pub fn from_path(config_path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_from_path(&config_path)?;
        debug!("Loaded config: {config:#?}");

        let sources = providers::build_sources(&config.providers);
        let collection = store::open_collection(config.data_dir().as_deref());
        let store = CacheStore::new(collection);
        // Later cycles pick up edits to the file.
        let provider: Arc<dyn ConfigProvider> = Arc::new(ConfigFile::new(config_path));
        Ok(Self::new(config, sources, store, provider))
    }

    pub fn new(
        config: AppConfig,
        sources: SourceSet,
        store: CacheStore,
        provider: Arc<dyn ConfigProvider>,
    ) -> Self {
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            sources.clone(),
            store.clone(),
            provider.clone(),
            config.refresh.guard_window(),
        ));
        let service = CommandService::new(orchestrator.clone(), sources.clone(), provider.clone());
        let monitor = Arc::new(VolatilityMonitor::new(
            sources,
            store.clone(),
            provider,
            Arc::new(LogNotifier),
        ));
        Self {
            config,
            store,
            orchestrator,
            service,
            monitor,
        }
    }

    pub async fn run(&self, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Refresh => cli::refresh::run(&self.service).await,
            AppCommand::Show => {
                let registry =
                    Registry::resolve(&self.config.series, &self.config.refresh.mandatory);
                cli::show::run(&self.store, &registry).await
            }
            AppCommand::History { ids, start, end } => {
                let range = match (start, end) {
                    (None, None) => None,
                    (start, end) => {
                        let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
                        let start = start.unwrap_or(end - chrono::Duration::days(365));
                        Some(DateRange::new(start, end)?)
                    }
                };
                cli::history::run(&self.service, &ids, range).await
            }
            AppCommand::Calc(calc) => cli::calc::run(&self.store, &calc).await,
            AppCommand::Watch => {
                let schedule = Schedule {
                    refresh_every: self.config.refresh.interval(),
                    volatility_every: Some(self.config.volatility.interval()),
                };
                info!("Watching, press Ctrl-C to stop");
                scheduler::run(self.orchestrator.clone(), self.monitor.clone(), schedule).await
            }
            AppCommand::CheckVolatility => {
                let check = self.monitor.check().await?;
                println!("{}", cli::refresh::render_volatility(&check));
                Ok(())
            }
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("sietrack starting...");
    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_config_path()?,
    };
    App::from_path(path)?.run(command).await
}
