use crate::core::error::SourceError;
use crate::core::indicator::{Indicator, SourceKind};
use crate::core::observation::{DateRange, LatestReading, Observation, percent_change};
use crate::core::source::{FetchMode, LatestResults, SourceClient};
use crate::providers::util::{fetch_politely, http_client};
use async_trait::async_trait;
use chrono::{NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const HISTORICAL_DEFAULT_DAYS: i64 = 365;

fn epoch_to_date(ts: i64) -> Option<String> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

/// Client for the Yahoo Finance chart API. Symbols are queried one at a time.
pub struct YahooFinanceProvider {
    base_url: String,
    delay: Duration,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, delay: Duration) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            delay,
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &str) -> Result<PriceChartItem, SourceError> {
        let url = format!("{}/v8/finance/chart/{}?{}", self.base_url, symbol, query);
        debug!("Requesting price data from {}", url);

        let client = http_client()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Request error: {e} for symbol: {symbol}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(SourceKind::Yahoo, status, symbol));
        }

        let text = response.text().await?;
        let data: YahooPriceResponse = serde_json::from_str(&text).map_err(|e| {
            SourceError::Network(format!("Failed to parse JSON response for {symbol}: {e}"))
        })?;

        data.chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                SourceError::NotFound(format!("No price data found for symbol: {symbol}"))
            })
    }

    #[instrument(
        name = "YahooPriceFetch",
        skip(self, indicator),
        fields(symbol = indicator.provider_key())
    )]
    async fn fetch_quote(&self, indicator: &Indicator) -> Result<LatestReading, SourceError> {
        let symbol = indicator.provider_key();
        let item = self.fetch_chart(symbol, "interval=1d&range=5d").await?;
        item.reading(symbol)
    }
}

#[derive(Deserialize, Debug)]
struct YahooPriceResponse {
    chart: PriceChartResult,
}

#[derive(Deserialize, Debug)]
struct PriceChartResult {
    result: Option<Vec<PriceChartItem>>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct PriceChartItem {
    meta: PriceChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct PriceChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(alias = "regularMarketTime")]
    regular_market_time: Option<i64>,
    #[serde(alias = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
    #[serde(alias = "previousClose")]
    previous_close: Option<f64>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
}

impl PriceChartMeta {
    fn previous_close(&self) -> Option<f64> {
        self.previous_close.or(self.chart_previous_close)
    }
}

impl PriceChartItem {
    /// Daily bars as observations, skipping bars without a close.
    fn observations(&self) -> Vec<Observation> {
        let closes = self
            .indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref());
        match (self.timestamp.as_ref(), closes) {
            (Some(timestamps), Some(closes)) => timestamps
                .iter()
                .zip(closes.iter())
                .filter_map(|(ts, close)| {
                    let close = (*close)?;
                    Some(Observation::new(epoch_to_date(*ts)?, close.to_string()))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn reading(&self, symbol: &str) -> Result<LatestReading, SourceError> {
        let bars = self.observations();
        let price = self
            .meta
            .regular_market_price
            .ok_or_else(|| SourceError::NotFound(format!("No market price for symbol: {symbol}")))?;
        let date = self
            .meta
            .regular_market_time
            .and_then(epoch_to_date)
            .or_else(|| bars.last().map(|b| b.date.clone()))
            .unwrap_or_default();

        let previous_close = self.meta.previous_close();
        let previous = previous_close.map(|close| {
            // The bar before the latest one carries the previous close's date.
            let previous_date = bars
                .iter()
                .rev()
                .find(|b| b.date != date)
                .map(|b| b.date.clone())
                .unwrap_or_default();
            Observation::new(previous_date, close.to_string())
        });
        let variation = previous_close.and_then(|close| percent_change(price, close));

        Ok(LatestReading {
            latest: Observation::new(date, price.to_string()),
            previous,
            variation,
            title: self.meta.short_name.clone(),
        })
    }
}

#[async_trait]
impl SourceClient for YahooFinanceProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Yahoo
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Sequential { delay: self.delay }
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn fetch_latest(
        &self,
        indicators: &[Indicator],
        _credential: Option<&str>,
    ) -> LatestResults {
        fetch_politely(indicators, self.delay, |indicator| self.fetch_quote(indicator)).await
    }

    #[instrument(
        name = "YahooHistoricalFetch",
        skip(self, indicator, _credential),
        fields(symbol = indicator.provider_key())
    )]
    async fn fetch_historical(
        &self,
        indicator: &Indicator,
        range: Option<DateRange>,
        _credential: Option<&str>,
    ) -> Result<Vec<Observation>, SourceError> {
        let symbol = indicator.provider_key();
        let range = range.unwrap_or_else(|| {
            DateRange::trailing_days(Utc::now().date_naive(), HISTORICAL_DEFAULT_DAYS)
        });
        let period1 = range.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive, extend to the end of the last day
        let period2 = (range.end + chrono::Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let item = self
            .fetch_chart(
                symbol,
                &format!("interval=1d&period1={period1}&period2={period2}"),
            )
            .await?;
        let observations = item.observations();
        if observations.is_empty() {
            return Err(SourceError::NotFound(format!(
                "No historical data for symbol: {symbol}"
            )));
        }
        Ok(observations)
    }
}
