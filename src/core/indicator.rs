//! Indicator descriptors, source tagging and the series registry

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

const YAHOO_PREFIX: &str = "YF:";
const INEGI_PREFIX: &str = "INEGI:";

/// The provider that owns an indicator id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Banxico,
    Yahoo,
    Inegi,
}

impl SourceKind {
    /// Resolves the owning source from an id's prefix.
    ///
    /// Banxico ids are bare SIE keys (`SF43718`, `SP1`), market quotes are
    /// `YF:<symbol>` and INEGI indicators are `INEGI:<number>`.
    pub fn from_id(id: &str) -> Option<Self> {
        if let Some(symbol) = id.strip_prefix(YAHOO_PREFIX) {
            return (!symbol.is_empty()).then_some(SourceKind::Yahoo);
        }
        if let Some(number) = id.strip_prefix(INEGI_PREFIX) {
            let valid = !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
            return valid.then_some(SourceKind::Inegi);
        }
        if is_sie_key(id) {
            return Some(SourceKind::Banxico);
        }
        None
    }

    /// Strips the routing prefix, leaving the provider's own identifier.
    pub fn provider_key<'a>(&self, id: &'a str) -> &'a str {
        match self {
            SourceKind::Banxico => id,
            SourceKind::Yahoo => id.strip_prefix(YAHOO_PREFIX).unwrap_or(id),
            SourceKind::Inegi => id.strip_prefix(INEGI_PREFIX).unwrap_or(id),
        }
    }

    pub fn all() -> [SourceKind; 3] {
        [SourceKind::Banxico, SourceKind::Yahoo, SourceKind::Inegi]
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SourceKind::Banxico => "Banxico",
                SourceKind::Yahoo => "Yahoo",
                SourceKind::Inegi => "INEGI",
            }
        )
    }
}

fn is_sie_key(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some('S') | Some('s'))
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && {
            let rest = chars.as_str();
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Number,
    Currency,
    Percent,
}

/// How often a series publishes, used to pick the comparison observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    Annual,
    #[default]
    Unknown,
}

impl Periodicity {
    /// Monthly and fortnightly series compare year over year.
    pub fn compares_year_over_year(&self) -> bool {
        matches!(self, Periodicity::Monthly | Periodicity::Fortnightly)
    }

    /// Guesses the periodicity from a provider date string such as `03/2024`
    /// or `2024/03`.
    pub fn infer_from_date(date: &str) -> Self {
        let parts: Vec<&str> = date.split('/').collect();
        match parts.as_slice() {
            [a, b] if a.len() == 2 && b.len() == 4 => Periodicity::Monthly,
            [a, b] if a.len() == 4 && b.len() == 2 => Periodicity::Monthly,
            [a] if a.len() == 4 && a.chars().all(|c| c.is_ascii_digit()) => Periodicity::Annual,
            _ => Periodicity::Unknown,
        }
    }
}

impl FromStr for Periodicity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "diaria" => Ok(Periodicity::Daily),
            "weekly" | "semanal" => Ok(Periodicity::Weekly),
            "fortnightly" | "quincenal" => Ok(Periodicity::Fortnightly),
            "monthly" | "mensual" => Ok(Periodicity::Monthly),
            "quarterly" | "trimestral" => Ok(Periodicity::Quarterly),
            "annual" | "anual" => Ok(Periodicity::Annual),
            _ => Err(anyhow::anyhow!("Invalid periodicity: {}", s)),
        }
    }
}

/// A user-configured indicator as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default)]
    pub periodicity: Periodicity,
}

fn default_decimals() -> u8 {
    2
}

impl IndicatorDescriptor {
    pub fn new(id: &str, title: &str, kind: ValueKind, periodicity: Periodicity) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            currency: None,
            decimals: default_decimals(),
            periodicity,
        }
    }

    fn with_currency(mut self, currency: &str, decimals: u8) -> Self {
        self.currency = Some(currency.to_string());
        self.decimals = decimals;
        self
    }
}

/// A descriptor whose owning source has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub source: SourceKind,
    pub descriptor: IndicatorDescriptor,
}

impl Indicator {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// The identifier the provider understands, without routing prefix.
    pub fn provider_key(&self) -> &str {
        self.source.provider_key(&self.descriptor.id)
    }

    pub fn periodicity(&self) -> Periodicity {
        self.descriptor.periodicity
    }
}

/// The set of indicators a refresh cycle works on.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    indicators: Vec<Indicator>,
    unresolved: Vec<String>,
}

impl Registry {
    /// Builds the registry from the configured series plus the mandatory ids.
    ///
    /// An empty configured list falls back to [`default_series`]. Duplicate
    /// ids are collapsed, first occurrence wins. Mandatory ids missing from the
    /// list are added with the built-in descriptor when one exists.
    pub fn resolve(configured: &[IndicatorDescriptor], mandatory: &[String]) -> Self {
        let defaults = default_series();
        let base: &[IndicatorDescriptor] = if configured.is_empty() {
            &defaults
        } else {
            configured
        };

        let mut seen = HashSet::new();
        let mut registry = Registry::default();

        let extra = mandatory.iter().map(|id| {
            defaults
                .iter()
                .chain(mandatory_series().iter())
                .find(|d| &d.id == id)
                .cloned()
                .unwrap_or_else(|| {
                    IndicatorDescriptor::new(id, id, ValueKind::Number, Periodicity::Unknown)
                })
        });

        for descriptor in base.iter().cloned().chain(extra) {
            if !seen.insert(descriptor.id.clone()) {
                continue;
            }
            match SourceKind::from_id(&descriptor.id) {
                Some(source) => registry.indicators.push(Indicator { source, descriptor }),
                None => registry.unresolved.push(descriptor.id),
            }
        }
        registry
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    /// Ids whose prefix matches no known source.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn for_source(&self, source: SourceKind) -> Vec<Indicator> {
        self.indicators
            .iter()
            .filter(|i| i.source == source)
            .cloned()
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.id() == id)
    }

    /// Every id in the registry, resolved or not.
    pub fn ids(&self) -> HashSet<String> {
        self.indicators
            .iter()
            .map(|i| i.id().to_string())
            .chain(self.unresolved.iter().cloned())
            .collect()
    }
}

/// Series tracked when the user has not configured any.
pub fn default_series() -> Vec<IndicatorDescriptor> {
    vec![
        IndicatorDescriptor::new(
            "SF61745",
            "Tasa objetivo Banxico (%)",
            ValueKind::Percent,
            Periodicity::Daily,
        ),
        IndicatorDescriptor::new(
            "SF43783",
            "TIIE a 28 días (%)",
            ValueKind::Percent,
            Periodicity::Daily,
        ),
        IndicatorDescriptor::new(
            "SF60633",
            "CETES a 28 días (%)",
            ValueKind::Percent,
            Periodicity::Weekly,
        ),
        IndicatorDescriptor::new(
            "SF43718",
            "Tipo de cambio FIX (MXN/USD)",
            ValueKind::Currency,
            Periodicity::Daily,
        )
        .with_currency("MXN", 4),
        IndicatorDescriptor::new(
            "SP30579",
            "INPC (índice)",
            ValueKind::Number,
            Periodicity::Fortnightly,
        ),
        IndicatorDescriptor::new(
            "SP68257",
            "Valor de UDIS",
            ValueKind::Currency,
            Periodicity::Daily,
        )
        .with_currency("MXN", 4),
        IndicatorDescriptor::new(
            "SF43671",
            "Base monetaria (millones de MXN)",
            ValueKind::Currency,
            Periodicity::Weekly,
        )
        .with_currency("MXN", 0),
    ]
}

/// Descriptors for mandatory ids that are not part of the default list.
fn mandatory_series() -> Vec<IndicatorDescriptor> {
    vec![IndicatorDescriptor::new(
        "SP74665",
        "Inflación general anual (%)",
        ValueKind::Percent,
        Periodicity::Monthly,
    )]
}

/// Ids the calculators depend on; always refreshed.
pub fn default_mandatory_ids() -> Vec<String> {
    ["SF43718", "SF61745", "SP74665", "SP68257", "SP30579"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
