//! Request/response front door for the refresh cycle and historical lookups.

use crate::core::config::ConfigProvider;
use crate::core::indicator::{
    Indicator, IndicatorDescriptor, Periodicity, Registry, SourceKind, ValueKind,
};
use crate::core::observation::{DateRange, Observation};
use crate::core::source::{SourceSet, credential_for};
use crate::refresh::{RefreshOrchestrator, RefreshReport};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Refresh,
    Historical {
        id: String,
        range: Option<DateRange>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Refreshed(RefreshReport),
    Observations {
        id: String,
        observations: Vec<Observation>,
    },
    Error(String),
}

pub struct CommandService {
    orchestrator: Arc<RefreshOrchestrator>,
    sources: SourceSet,
    config: Arc<dyn ConfigProvider>,
}

impl CommandService {
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        sources: SourceSet,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            orchestrator,
            sources,
            config,
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!(?request, "Handling request");
        let response = match request {
            Request::Refresh => match self.orchestrator.refresh().await {
                Ok(report) => Response::Refreshed(report),
                Err(e) => Response::Error(e.to_string()),
            },
            Request::Historical { id, range } => match self.historical(&id, range).await {
                Ok(observations) => Response::Observations { id, observations },
                Err(message) => Response::Error(message),
            },
        };
        if let Response::Error(message) = &response {
            warn!(error = %message, "Request failed");
        }
        response
    }

    async fn historical(
        &self,
        id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<Observation>, String> {
        let config = self.config.current().await.map_err(|e| format!("{e:#}"))?;
        let registry = Registry::resolve(&config.series, &config.refresh.mandatory);
        let indicator = match registry.find(id) {
            Some(indicator) => indicator.clone(),
            None => {
                let source = SourceKind::from_id(id)
                    .ok_or_else(|| format!("Unrecognized indicator id: {id}"))?;
                Indicator {
                    source,
                    descriptor: IndicatorDescriptor::new(
                        id,
                        id,
                        ValueKind::Number,
                        Periodicity::Unknown,
                    ),
                }
            }
        };

        let client = self
            .sources
            .get(indicator.source)
            .ok_or_else(|| format!("No client available for {}", indicator.source))?;
        let credentials = config.credentials.to_credentials();
        let credential = credential_for(client.as_ref(), &credentials)
            .ok_or_else(|| format!("Missing credential for {}", indicator.source))?;

        client
            .fetch_historical(&indicator, range, credential)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheStore;
    use crate::core::error::SourceError;
    use crate::core::source::FetchMode;
    use crate::store::memory::MemoryCollection;
    use crate::testing::{FakeSource, config};
    use std::time::Duration;

    fn service(sources: SourceSet, cfg: crate::core::config::AppConfig) -> CommandService {
        let cfg: Arc<dyn ConfigProvider> = Arc::new(cfg);
        let orchestrator = RefreshOrchestrator::new(
            sources.clone(),
            CacheStore::new(Arc::new(MemoryCollection::new())),
            cfg.clone(),
            Duration::from_secs(120),
        );
        CommandService::new(Arc::new(orchestrator), sources, cfg)
    }

    #[tokio::test]
    async fn test_historical_routes_to_owning_client_with_credential() {
        let series = vec![
            Observation::new("01/10/2024", "19.50"),
            Observation::new("02/10/2024", "19.60"),
        ];
        let banxico = Arc::new(
            FakeSource::new(SourceKind::Banxico, FetchMode::Batch)
                .history("SF43718", Ok(series.clone())),
        );
        let inegi = Arc::new(FakeSource::sequential(SourceKind::Inegi));
        let svc = service(
            SourceSet::new().with(banxico.clone()).with(inegi.clone()),
            config(&["SF43718"], &[(SourceKind::Banxico, "sie-token")]),
        );

        let response = svc
            .handle(Request::Historical {
                id: "SF43718".to_string(),
                range: None,
            })
            .await;
        assert_eq!(
            response,
            Response::Observations {
                id: "SF43718".to_string(),
                observations: series
            }
        );
        assert_eq!(banxico.credentials_seen(), vec![Some("sie-token".to_string())]);
        assert!(inegi.credentials_seen().is_empty());
    }

    #[tokio::test]
    async fn test_historical_errors() {
        let banxico = Arc::new(
            FakeSource::new(SourceKind::Banxico, FetchMode::Batch)
                .history("SF1", Err(SourceError::NotFound("No data for series: SF1".to_string()))),
        );
        let inegi = Arc::new(FakeSource::sequential(SourceKind::Inegi));
        let svc = service(
            SourceSet::new().with(banxico).with(inegi.clone()),
            config(&["SF1"], &[(SourceKind::Banxico, "t")]),
        );

        let historical = |id: &str| Request::Historical {
            id: id.to_string(),
            range: None,
        };
        assert_eq!(
            svc.handle(historical("SF1")).await,
            Response::Error("Not found: No data for series: SF1".to_string())
        );
        assert_eq!(
            svc.handle(historical("INEGI:444557")).await,
            Response::Error("Missing credential for INEGI".to_string())
        );
        assert_eq!(
            svc.handle(historical("bogus")).await,
            Response::Error("Unrecognized indicator id: bogus".to_string())
        );
        assert!(inegi.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_request_returns_report() {
        let banxico =
            Arc::new(FakeSource::new(SourceKind::Banxico, FetchMode::Batch).ok("SF43718", "19.89"));
        let svc = service(
            SourceSet::new().with(banxico),
            config(&["SF43718"], &[(SourceKind::Banxico, "t")]),
        );

        match svc.handle(Request::Refresh).await {
            Response::Refreshed(report) => assert_eq!(report.updated, 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
