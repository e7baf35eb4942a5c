//! Conversions and rate calculations over cached indicator values.
use crate::core::cache::CacheSnapshot;
use anyhow::{Result, anyhow, bail};

pub const FIX_ID: &str = "SF43718";
pub const TARGET_RATE_ID: &str = "SF61745";
pub const ANNUAL_INFLATION_ID: &str = "SP74665";
pub const UDI_ID: &str = "SP68257";
pub const INPC_ID: &str = "SP30579";

/// The reference values the calculators read from the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceRates {
    /// MXN per USD.
    pub fix: Option<f64>,
    /// MXN per UDI.
    pub udi: Option<f64>,
    /// Percent.
    pub target_rate: Option<f64>,
    /// Percent.
    pub inflation: Option<f64>,
    pub inpc: Option<f64>,
}

impl ReferenceRates {
    pub fn from_snapshot(snapshot: &CacheSnapshot) -> Self {
        let value = |id: &str| snapshot.get(id).and_then(|entry| entry.numeric());
        Self {
            fix: value(FIX_ID),
            udi: value(UDI_ID),
            target_rate: value(TARGET_RATE_ID),
            inflation: value(ANNUAL_INFLATION_ID),
            inpc: value(INPC_ID),
        }
    }

    pub fn fix(&self) -> Result<f64> {
        self.fix.ok_or_else(|| anyhow!("No FIX rate ({FIX_ID}) in cache"))
    }

    pub fn udi(&self) -> Result<f64> {
        self.udi.ok_or_else(|| anyhow!("No UDI value ({UDI_ID}) in cache"))
    }

    /// Real rate from the cached target rate and annual inflation.
    pub fn real_rate(&self) -> Result<f64> {
        let nominal = self
            .target_rate
            .ok_or_else(|| anyhow!("No target rate ({TARGET_RATE_ID}) in cache"))?;
        let inflation = self
            .inflation
            .ok_or_else(|| anyhow!("No annual inflation ({ANNUAL_INFLATION_ID}) in cache"))?;
        fisher_real_rate(nominal, inflation)
    }
}

fn positive(rate: f64, name: &str) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        bail!("{name} must be positive, got {rate}")
    }
}

pub fn usd_to_mxn(usd: f64, fix: f64) -> Result<f64> {
    Ok(usd * positive(fix, "FIX rate")?)
}

pub fn mxn_to_usd(mxn: f64, fix: f64) -> Result<f64> {
    Ok(mxn / positive(fix, "FIX rate")?)
}

pub fn udi_to_mxn(udis: f64, udi_value: f64) -> Result<f64> {
    Ok(udis * positive(udi_value, "UDI value")?)
}

pub fn mxn_to_udi(mxn: f64, udi_value: f64) -> Result<f64> {
    Ok(mxn / positive(udi_value, "UDI value")?)
}

/// Exact Fisher equation, both inputs and the result in percent.
pub fn fisher_real_rate(nominal_percent: f64, inflation_percent: f64) -> Result<f64> {
    let inflation = 1.0 + inflation_percent / 100.0;
    if inflation <= 0.0 {
        bail!("Inflation of {inflation_percent}% is out of range");
    }
    Ok(((1.0 + nominal_percent / 100.0) / inflation - 1.0) * 100.0)
}

/// Ratio of the recent INPC to the older one, truncated (not rounded) to
/// four decimals as the tax authority requires.
pub fn fiscal_update_factor(recent_inpc: f64, older_inpc: f64) -> Result<f64> {
    let older = positive(older_inpc, "Older INPC")?;
    let recent = positive(recent_inpc, "Recent INPC")?;
    Ok(truncate(recent / older, 4))
}

fn truncate(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    // Nudge past representation error such as 1.0499999999.
    ((value * scale) + 1e-9).floor() / scale
}
