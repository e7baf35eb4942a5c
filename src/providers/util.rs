use crate::core::error::SourceError;
use crate::core::indicator::Indicator;
use crate::core::observation::LatestReading;
use crate::core::source::LatestResults;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "sietrack/0.1";

/// Builds the HTTP client shared by a provider. Timeouts are left to
/// reqwest's defaults.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Fetches indicators one at a time, sleeping `delay` between requests.
///
/// The pause is skipped after the last id. A rate-limit error stops the
/// loop; ids after it are left out of the result.
pub async fn fetch_politely<'a, F, Fut>(
    indicators: &'a [Indicator],
    delay: Duration,
    mut fetch: F,
) -> LatestResults
where
    F: FnMut(&'a Indicator) -> Fut,
    Fut: Future<Output = Result<LatestReading, SourceError>>,
{
    let mut results = LatestResults::new();
    for (position, indicator) in indicators.iter().enumerate() {
        let result = fetch(indicator).await;
        let rate_limited = matches!(&result, Err(e) if e.is_rate_limited());
        results.insert(indicator.id().to_string(), result);

        if rate_limited {
            warn!(
                id = indicator.id(),
                skipped = indicators.len() - position - 1,
                "Rate limited, stopping"
            );
            break;
        }
        if position + 1 < indicators.len() && !delay.is_zero() {
            debug!("Waiting {:?} before next request", delay);
            tokio::time::sleep(delay).await;
        }
    }
    results
}

/// Reads the body of a non-success response for error classification.
pub async fn error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicator::{IndicatorDescriptor, Periodicity, SourceKind, ValueKind};
    use crate::core::observation::Observation;
    use std::sync::Mutex;

    fn indicators(ids: &[&str]) -> Vec<Indicator> {
        ids.iter()
            .map(|id| Indicator {
                source: SourceKind::Yahoo,
                descriptor: IndicatorDescriptor::new(id, id, ValueKind::Number, Periodicity::Daily),
            })
            .collect()
    }

    fn reading() -> LatestReading {
        LatestReading {
            latest: Observation::new("2024-01-02", "1.0"),
            previous: None,
            variation: None,
            title: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_requests_but_not_after_last() {
        let list = indicators(&["YF:A", "YF:B", "YF:C"]);
        let start = tokio::time::Instant::now();
        let results =
            fetch_politely(&list, Duration::from_secs(2), |_| async { Ok(reading()) }).await;

        assert_eq!(results.len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_rate_limit() {
        let list = indicators(&["YF:A", "YF:B", "YF:C"]);
        let calls = Mutex::new(Vec::new());
        let results = fetch_politely(&list, Duration::from_secs(1), |indicator| {
            calls.lock().unwrap().push(indicator.id().to_string());
            let id = indicator.id().to_string();
            async move {
                if id == "YF:B" {
                    Err(SourceError::RateLimited(SourceKind::Yahoo))
                } else {
                    Ok(reading())
                }
            }
        })
        .await;

        assert_eq!(*calls.lock().unwrap(), vec!["YF:A", "YF:B"]);
        assert_eq!(results.len(), 2);
        assert!(results["YF:B"].as_ref().unwrap_err().is_rate_limited());
        assert!(!results.contains_key("YF:C"));
    }
}
