use crate::core::error::SourceError;
use crate::core::indicator::{Indicator, SourceKind};
use crate::core::observation::{DateRange, LatestReading, Observation};
use crate::core::source::{FetchMode, LatestResults, SourceClient};
use crate::providers::util::{error_body, fetch_politely, http_client};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Dataset namespaces an indicator may live in, tried in order.
const NAMESPACES: [&str; 2] = ["BIE", "BISE"];

/// Client for the INEGI indicators API.
pub struct InegiProvider {
    base_url: String,
    delay: Duration,
}

impl InegiProvider {
    pub fn new(base_url: &str, delay: Duration) -> Self {
        InegiProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            delay,
        }
    }

    async fn fetch_namespace(
        &self,
        key: &str,
        namespace: &str,
        token: &str,
    ) -> Result<Vec<Observation>, SourceError> {
        let url = format!(
            "{}/INDICATOR/{}/es/00/false/{}/2.0/{}?type=json",
            self.base_url, key, namespace, token
        );
        debug!(indicator = key, namespace, "Requesting INEGI indicator");

        let client = http_client()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("Request error: {e} for indicator: {key}")))?;

        let status = response.status();
        if !status.is_success() {
            // INEGI answers most failures with 400 and a text reason.
            if status == reqwest::StatusCode::BAD_REQUEST {
                let body = error_body(response).await;
                if body.to_lowercase().contains("token") {
                    return Err(SourceError::Auth(SourceKind::Inegi));
                }
                return Err(SourceError::NotFound(format!("{key} in {namespace}")));
            }
            return Err(SourceError::from_status(
                SourceKind::Inegi,
                status,
                &format!("{key} in {namespace}"),
            ));
        }

        let text = response.text().await?;
        let data: InegiResponse = serde_json::from_str(&text).map_err(|e| {
            SourceError::Network(format!("Failed to parse INEGI response for {key}: {e}"))
        })?;

        let mut observations: Vec<Observation> = data
            .series
            .into_iter()
            .next()
            .map(|s| s.observations)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|o| Some(Observation::new(o.period, o.value?)))
            .collect();
        if observations.is_empty() {
            return Err(SourceError::NotFound(format!("{key} in {namespace}")));
        }
        observations.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(observations)
    }

    /// Tries every namespace until one has data. Credential and quota errors
    /// stop the search.
    async fn fetch_series(&self, key: &str, token: &str) -> Result<Vec<Observation>, SourceError> {
        for namespace in NAMESPACES {
            match self.fetch_namespace(key, namespace, token).await {
                Ok(observations) => return Ok(observations),
                Err(SourceError::NotFound(_)) => {
                    debug!(indicator = key, namespace, "Not found in namespace");
                }
                Err(e) => return Err(e),
            }
        }
        Err(SourceError::NotFound(format!(
            "No data for indicator {} in {}",
            key,
            NAMESPACES.join(" or ")
        )))
    }

    #[instrument(
        name = "InegiFetch",
        skip(self, indicator, token),
        fields(indicator = indicator.provider_key())
    )]
    async fn fetch_one(
        &self,
        indicator: &Indicator,
        token: &str,
    ) -> Result<LatestReading, SourceError> {
        let key = indicator.provider_key();
        let observations = self.fetch_series(key, token).await?;
        LatestReading::from_series(&observations, indicator.periodicity(), None)
            .ok_or_else(|| SourceError::NotFound(format!("No valid data for indicator: {key}")))
    }
}

#[derive(Deserialize, Debug)]
struct InegiResponse {
    #[serde(rename = "Series", default)]
    series: Vec<InegiSeries>,
}

#[derive(Deserialize, Debug)]
struct InegiSeries {
    #[serde(rename = "OBSERVATIONS", default)]
    observations: Vec<InegiObservation>,
}

#[derive(Deserialize, Debug)]
struct InegiObservation {
    #[serde(rename = "TIME_PERIOD")]
    period: String,
    #[serde(rename = "OBS_VALUE")]
    value: Option<String>,
}

/// First day of an INEGI period (`2024`, `2024/03`, `2024/03/15`).
fn period_start(period: &str) -> Option<NaiveDate> {
    let parts: Vec<u32> = period
        .split('/')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<u32>>>()?;
    match parts.as_slice() {
        [year] => NaiveDate::from_ymd_opt(*year as i32, 1, 1),
        [year, month] => NaiveDate::from_ymd_opt(*year as i32, *month, 1),
        [year, month, day] => NaiveDate::from_ymd_opt(*year as i32, *month, *day),
        _ => None,
    }
}

#[async_trait]
impl SourceClient for InegiProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Inegi
    }

    fn mode(&self) -> FetchMode {
        FetchMode::Sequential { delay: self.delay }
    }

    async fn fetch_latest(
        &self,
        indicators: &[Indicator],
        credential: Option<&str>,
    ) -> LatestResults {
        let token = credential.unwrap_or_default();
        fetch_politely(indicators, self.delay, |indicator| self.fetch_one(indicator, token)).await
    }

    async fn fetch_historical(
        &self,
        indicator: &Indicator,
        range: Option<DateRange>,
        credential: Option<&str>,
    ) -> Result<Vec<Observation>, SourceError> {
        let key = indicator.provider_key();
        let observations = self
            .fetch_series(key, credential.unwrap_or_default())
            .await?;
        let observations: Vec<Observation> = observations
            .into_iter()
            .filter(|o| o.is_valid())
            .filter(|o| match (range, period_start(&o.date)) {
                (Some(range), Some(date)) => range.start <= date && date <= range.end,
                _ => true,
            })
            .collect();
        if observations.is_empty() {
            return Err(SourceError::NotFound(format!("No data for indicator: {key}")));
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicator::{IndicatorDescriptor, Periodicity, ValueKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn indicator(id: &str, periodicity: Periodicity) -> Indicator {
        Indicator {
            source: SourceKind::Inegi,
            descriptor: IndicatorDescriptor::new(id, id, ValueKind::Number, periodicity),
        }
    }

    fn body(observations: &[(&str, Option<&str>)]) -> String {
        let items: Vec<String> = observations
            .iter()
            .map(|(period, value)| match value {
                Some(v) => format!(r#"{{"TIME_PERIOD": "{period}", "OBS_VALUE": "{v}"}}"#),
                None => format!(r#"{{"TIME_PERIOD": "{period}", "OBS_VALUE": null}}"#),
            })
            .collect();
        format!(
            r#"{{"Header": {{}}, "Series": [{{"INDICADOR": "1", "OBSERVATIONS": [{}]}}]}}"#,
            items.join(",")
        )
    }

    async fn mount(server: &MockServer, namespace: &str, status: u16, response: &str) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/INDICATOR/444557/es/00/false/{namespace}/2.0/tok"
            )))
            .respond_with(ResponseTemplate::new(status).set_body_string(response))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_latest_sorted_and_nulls_skipped() {
        let server = MockServer::start().await;
        // Newest first, as the API returns it
        let response = body(&[
            ("2024/03", None),
            ("2024/02", Some("110.0")),
            ("2024/01", Some("100.0")),
        ]);
        mount(&server, "BIE", 200, &response).await;

        let provider = InegiProvider::new(&server.uri(), Duration::ZERO);
        let results = provider
            .fetch_latest(&[indicator("INEGI:444557", Periodicity::Unknown)], Some("tok"))
            .await;
        let reading = results["INEGI:444557"].as_ref().unwrap();
        assert_eq!(reading.latest, Observation::new("2024/02", "110.0"));
        assert_eq!(reading.previous.as_ref().unwrap().date, "2024/01");
        assert!((reading.variation.unwrap() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_falls_back_to_second_namespace() {
        let server = MockServer::start().await;
        mount(&server, "BIE", 400, r#"["ErrorInfo:No se encontró resultado"]"#).await;
        mount(&server, "BISE", 200, &body(&[("2023", Some("5.5"))])).await;

        let provider = InegiProvider::new(&server.uri(), Duration::ZERO);
        let results = provider
            .fetch_latest(&[indicator("INEGI:444557", Periodicity::Annual)], Some("tok"))
            .await;
        assert_eq!(results["INEGI:444557"].as_ref().unwrap().latest.value, "5.5");
    }

    #[tokio::test]
    async fn test_not_found_in_any_namespace() {
        let server = MockServer::start().await;
        mount(&server, "BIE", 404, "").await;
        mount(&server, "BISE", 200, r#"{"Series": []}"#).await;

        let provider = InegiProvider::new(&server.uri(), Duration::ZERO);
        let results = provider
            .fetch_latest(&[indicator("INEGI:444557", Periodicity::Monthly)], Some("tok"))
            .await;
        assert_eq!(
            results["INEGI:444557"],
            Err(SourceError::NotFound(
                "No data for indicator 444557 in BIE or BISE".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_bad_token_stops_namespace_search() {
        let server = MockServer::start().await;
        mount(&server, "BIE", 400, r#"["ErrorInfo:Token no valido"]"#).await;
        Mock::given(method("GET"))
            .and(path("/INDICATOR/444557/es/00/false/BISE/2.0/tok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = InegiProvider::new(&server.uri(), Duration::ZERO);
        let results = provider
            .fetch_latest(&[indicator("INEGI:444557", Periodicity::Monthly)], Some("tok"))
            .await;
        assert_eq!(
            results["INEGI:444557"],
            Err(SourceError::Auth(SourceKind::Inegi))
        );
    }

    #[tokio::test]
    async fn test_historical_filters_range() {
        let server = MockServer::start().await;
        let response = body(&[
            ("2023/12", Some("90")),
            ("2024/01", Some("100")),
            ("2024/02", Some("110")),
        ]);
        mount(&server, "BIE", 200, &response).await;

        let provider = InegiProvider::new(&server.uri(), Duration::ZERO);
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
        .unwrap();
        let observations = provider
            .fetch_historical(
                &indicator("INEGI:444557", Periodicity::Monthly),
                Some(range),
                Some("tok"),
            )
            .await
            .unwrap();
        assert_eq!(
            observations,
            vec![
                Observation::new("2024/01", "100"),
                Observation::new("2024/02", "110")
            ]
        );
    }

    #[test]
    fn test_period_start() {
        assert_eq!(period_start("2024"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(period_start("2024/03"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(period_start("2024/03/15"), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(period_start("Q1"), None);
    }
}
