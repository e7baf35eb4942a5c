pub mod banxico;
pub mod inegi;
pub mod util;
pub mod yahoo_finance;

use crate::core::config::ProvidersConfig;
use crate::core::source::SourceSet;
use std::sync::Arc;
use std::time::Duration;

/// Builds one client per source from the provider configuration.
pub fn build_sources(config: &ProvidersConfig) -> SourceSet {
    SourceSet::new()
        .with(Arc::new(banxico::BanxicoProvider::new(
            &config.banxico.base_url,
            config.banxico.batch_lookback_days,
            config.banxico.retry_lookback_days,
        )))
        .with(Arc::new(yahoo_finance::YahooFinanceProvider::new(
            &config.yahoo.base_url,
            Duration::from_millis(config.yahoo.delay_ms),
        )))
        .with(Arc::new(inegi::InegiProvider::new(
            &config.inegi.base_url,
            Duration::from_millis(config.inegi.delay_ms),
        )))
}
