use crate::core::error::SourceError;
use crate::core::indicator::{Indicator, SourceKind};
use crate::core::observation::{DateRange, LatestReading, Observation};
use crate::core::source::{FetchMode, LatestResults, SourceClient};
use crate::providers::util::http_client;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";
const HISTORICAL_DEFAULT_DAYS: i64 = 365;

/// Client for the Banxico SIE time-series API. Requests for many series are
/// batched into one call.
pub struct BanxicoProvider {
    base_url: String,
    batch_lookback_days: i64,
    retry_lookback_days: i64,
}

impl BanxicoProvider {
    pub fn new(base_url: &str, batch_lookback_days: i64, retry_lookback_days: i64) -> Self {
        BanxicoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            batch_lookback_days,
            retry_lookback_days,
        }
    }

    async fn fetch_range(
        &self,
        keys: &[&str],
        range: DateRange,
        token: &str,
    ) -> Result<Vec<SieSeries>, SourceError> {
        let subject = keys.join(",");
        let url = format!(
            "{}/series/{}/datos/{}/{}",
            self.base_url,
            subject,
            range.start.format(DATE_FORMAT),
            range.end.format(DATE_FORMAT)
        );
        debug!("Requesting series data from {}", url);

        let url = reqwest::Url::parse_with_params(&url, &[("mediaType", "json"), ("token", token)])
            .map_err(|e| SourceError::Network(format!("Invalid URL {url}: {e}")))?;
        let client = http_client()?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                SourceError::Network(format!("Request error: {e} for series: {subject}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(SourceKind::Banxico, status, &subject));
        }

        let text = response.text().await?;
        let data: SieResponse = serde_json::from_str(&text).map_err(|e| {
            SourceError::Network(format!("Failed to parse SIE response for {subject}: {e}"))
        })?;
        Ok(data.bmx.series)
    }

    /// Fetches one indicator, widening the window when the recent one holds
    /// no valid value.
    async fn fetch_one(
        &self,
        indicator: &Indicator,
        token: &str,
        today: NaiveDate,
    ) -> Result<LatestReading, SourceError> {
        let key = indicator.provider_key();
        let recent = DateRange::trailing_days(today, self.batch_lookback_days);
        let series = self.fetch_range(&[key], recent, token).await?;
        if let Some(reading) = find_series(&series, key).and_then(|s| s.reading(indicator)) {
            return Ok(reading);
        }
        self.fetch_deep(indicator, token, today).await
    }

    async fn fetch_deep(
        &self,
        indicator: &Indicator,
        token: &str,
        today: NaiveDate,
    ) -> Result<LatestReading, SourceError> {
        let key = indicator.provider_key();
        debug!(id = key, "No valid value in recent window, retrying with deeper lookback");
        let deep = DateRange::trailing_days(today, self.retry_lookback_days);
        let series = self.fetch_range(&[key], deep, token).await?;
        find_series(&series, key)
            .and_then(|s| s.reading(indicator))
            .ok_or_else(|| SourceError::NotFound(format!("No valid data for series: {key}")))
    }

    /// Resolves indicators one by one. Credential and quota failures apply to
    /// every id that has not been attempted yet.
    async fn fetch_each<'a, I>(
        &self,
        indicators: I,
        token: &str,
        today: NaiveDate,
        deep_only: bool,
        results: &mut LatestResults,
    ) where
        I: IntoIterator<Item = &'a Indicator>,
    {
        let mut abort: Option<SourceError> = None;
        for indicator in indicators {
            if let Some(err) = &abort {
                results.insert(indicator.id().to_string(), Err(err.clone()));
                continue;
            }
            let result = if deep_only {
                self.fetch_deep(indicator, token, today).await
            } else {
                self.fetch_one(indicator, token, today).await
            };
            if let Err(e @ (SourceError::Auth(_) | SourceError::RateLimited(_))) = &result {
                abort = Some(e.clone());
            }
            results.insert(indicator.id().to_string(), result);
        }
    }
}

#[derive(Deserialize, Debug)]
struct SieResponse {
    bmx: SieBody,
}

#[derive(Deserialize, Debug)]
struct SieBody {
    #[serde(default)]
    series: Vec<SieSeries>,
}

#[derive(Deserialize, Debug)]
struct SieSeries {
    #[serde(rename = "idSerie")]
    id: String,
    #[serde(rename = "titulo")]
    title: Option<String>,
    #[serde(rename = "datos", default)]
    data: Vec<SieDatum>,
}

#[derive(Deserialize, Debug)]
struct SieDatum {
    #[serde(rename = "fecha")]
    date: String,
    #[serde(rename = "dato")]
    value: String,
}

impl SieSeries {
    fn observations(&self) -> Vec<Observation> {
        self.data
            .iter()
            .map(|d| Observation::new(d.date.clone(), d.value.clone()))
            .collect()
    }

    fn reading(&self, indicator: &Indicator) -> Option<LatestReading> {
        LatestReading::from_series(
            &self.observations(),
            indicator.periodicity(),
            self.title.clone(),
        )
    }
}

fn find_series<'a>(series: &'a [SieSeries], key: &str) -> Option<&'a SieSeries> {
    series.iter().find(|s| s.id.eq_ignore_ascii_case(key))
}

#[async_trait]
impl SourceClient for BanxicoProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Banxico
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Batch
    }

    #[instrument(name = "BanxicoLatestFetch", skip_all, fields(count = indicators.len()))]
    async fn fetch_latest(
        &self,
        indicators: &[Indicator],
        credential: Option<&str>,
    ) -> LatestResults {
        let token = credential.unwrap_or_default();
        let today = Utc::now().date_naive();
        let mut results = LatestResults::new();
        if indicators.is_empty() {
            return results;
        }

        let keys: Vec<&str> = indicators.iter().map(|i| i.provider_key()).collect();
        let window = DateRange::trailing_days(today, self.batch_lookback_days);

        match self.fetch_range(&keys, window, token).await {
            Ok(series) => {
                let by_key: HashMap<String, &SieSeries> = series
                    .iter()
                    .map(|s| (s.id.to_uppercase(), s))
                    .collect();
                let mut missing = Vec::new();
                for indicator in indicators {
                    let reading = by_key
                        .get(&indicator.provider_key().to_uppercase())
                        .and_then(|s| s.reading(indicator));
                    match reading {
                        Some(reading) => {
                            results.insert(indicator.id().to_string(), Ok(reading));
                        }
                        None => missing.push(indicator),
                    }
                }
                if !missing.is_empty() {
                    debug!(count = missing.len(), "Retrying series without a valid value");
                    self.fetch_each(missing, token, today, true, &mut results)
                        .await;
                }
            }
            Err(e @ (SourceError::Network(_) | SourceError::NotFound(_))) => {
                warn!("Batch request failed: {}. Fetching series one by one", e);
                self.fetch_each(indicators, token, today, false, &mut results)
                    .await;
            }
            Err(e) => {
                warn!("Batch request failed: {}", e);
                for indicator in indicators {
                    results.insert(indicator.id().to_string(), Err(e.clone()));
                }
            }
        }
        results
    }

    #[instrument(
        name = "BanxicoHistoricalFetch",
        skip(self, indicator, credential),
        fields(id = indicator.id())
    )]
    async fn fetch_historical(
        &self,
        indicator: &Indicator,
        range: Option<DateRange>,
        credential: Option<&str>,
    ) -> Result<Vec<Observation>, SourceError> {
        let key = indicator.provider_key();
        let range = range.unwrap_or_else(|| {
            DateRange::trailing_days(Utc::now().date_naive(), HISTORICAL_DEFAULT_DAYS)
        });
        let series = self
            .fetch_range(&[key], range, credential.unwrap_or_default())
            .await?;
        let observations: Vec<Observation> = find_series(&series, key)
            .map(|s| s.observations())
            .unwrap_or_default()
            .into_iter()
            .filter(|o| o.is_valid())
            .collect();
        if observations.is_empty() {
            return Err(SourceError::NotFound(format!("No data for series: {key}")));
        }
        Ok(observations)
    }
}
