use crate::core::indicator::{IndicatorDescriptor, SourceKind, default_mandatory_ids};
use crate::core::source::Credentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CredentialsConfig {
    pub banxico: Option<String>,
    pub inegi: Option<String>,
    pub yahoo: Option<String>,
}

impl CredentialsConfig {
    pub fn to_credentials(&self) -> Credentials {
        let mut credentials = Credentials::new();
        for (kind, value) in [
            (SourceKind::Banxico, &self.banxico),
            (SourceKind::Inegi, &self.inegi),
            (SourceKind::Yahoo, &self.yahoo),
        ] {
            if let Some(value) = value {
                credentials.set(kind, value);
            }
        }
        credentials
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BanxicoProviderConfig {
    pub base_url: String,
    /// Window of the batched request, wide enough for year-over-year.
    #[serde(default = "default_batch_lookback_days")]
    pub batch_lookback_days: i64,
    /// Window used when retrying an id that had no valid value.
    #[serde(default = "default_retry_lookback_days")]
    pub retry_lookback_days: i64,
}

fn default_batch_lookback_days() -> i64 {
    400
}

fn default_retry_lookback_days() -> i64 {
    5 * 365
}

impl Default for BanxicoProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.banxico.org.mx/SieAPIRest/service/v1".to_string(),
            batch_lookback_days: default_batch_lookback_days(),
            retry_lookback_days: default_retry_lookback_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
    #[serde(default = "default_yahoo_delay_ms")]
    pub delay_ms: u64,
}

fn default_yahoo_delay_ms() -> u64 {
    2_000
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            delay_ms: default_yahoo_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InegiProviderConfig {
    pub base_url: String,
    #[serde(default = "default_inegi_delay_ms")]
    pub delay_ms: u64,
}

fn default_inegi_delay_ms() -> u64 {
    15_000
}

impl Default for InegiProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.inegi.org.mx/app/api/indicadores/desarrolladores/jsonxml"
                .to_string(),
            delay_ms: default_inegi_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub banxico: BanxicoProviderConfig,
    #[serde(default)]
    pub yahoo: YahooProviderConfig,
    #[serde(default)]
    pub inegi: InegiProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_minutes")]
    pub interval_minutes: u64,
    /// A running cycle younger than this rejects new requests.
    #[serde(default = "default_guard_window_secs")]
    pub guard_window_secs: u64,
    /// Ids refreshed even when absent from `series`.
    #[serde(default = "default_mandatory_ids")]
    pub mandatory: Vec<String>,
    /// Keep the last good value when a fetch fails.
    #[serde(default = "default_true")]
    pub retain_stale_on_error: bool,
}

fn default_refresh_interval_minutes() -> u64 {
    60
}

fn default_guard_window_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_refresh_interval_minutes(),
            guard_window_secs: default_guard_window_secs(),
            mandatory: default_mandatory_ids(),
            retain_stale_on_error: true,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    pub fn guard_window(&self) -> Duration {
        Duration::from_secs(self.guard_window_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VolatilityConfig {
    #[serde(default = "default_volatility_indicator")]
    pub indicator: String,
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
    #[serde(default = "default_volatility_interval_minutes")]
    pub interval_minutes: u64,
}

fn default_volatility_indicator() -> String {
    "YF:MXN=X".to_string()
}

fn default_threshold_percent() -> f64 {
    1.0
}

fn default_volatility_interval_minutes() -> u64 {
    15
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            indicator: default_volatility_indicator(),
            threshold_percent: default_threshold_percent(),
            interval_minutes: default_volatility_interval_minutes(),
        }
    }
}

impl VolatilityConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub series: Vec<IndicatorDescriptor>,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("mx", "sietrack", "sietrack")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Some(PathBuf::from(custom_path));
        }
        ProjectDirs::from("mx", "sietrack", "sietrack").map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

/// Supplies the configuration each refresh cycle starts from.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn current(&self) -> Result<AppConfig>;
}

/// A fixed configuration.
#[async_trait]
impl ConfigProvider for AppConfig {
    async fn current(&self) -> Result<AppConfig> {
        Ok(self.clone())
    }
}

/// Re-reads the configuration file on every call so edits apply to the next
/// cycle.
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for ConfigFile {
    async fn current(&self) -> Result<AppConfig> {
        AppConfig::load_from_path(&self.path)
    }
}
