use sietrack::AppCommand;
use sietrack::cli::calc::CalcCommand;
use sietrack::core::error::EntryErrorKind;
use std::fs;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn sie_body(id: &str, points: &[(&str, &str)]) -> String {
        let datos: Vec<String> = points
            .iter()
            .map(|(fecha, dato)| format!(r#"{{"fecha": "{fecha}", "dato": "{dato}"}}"#))
            .collect();
        format!(
            r#"{{"bmx": {{"series": [{{"idSerie": "{id}", "titulo": "Tipo de cambio FIX", "datos": [{}]}}]}}}}"#,
            datos.join(",")
        )
    }

    /// One server answering for all three providers.
    pub async fn create_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/series/SF43718/datos/"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sie_body(
                "SF43718",
                &[("14/10/2024", "19.50"), ("15/10/2024", "19.89"), ("16/10/2024", "N/E")],
            )))
            .mount(&mock_server)
            .await;

        let quote = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 20.25,
                        "regularMarketTime": 1729022400,
                        "chartPreviousClose": 20.0,
                        "shortName": "USD/MXN"
                    }
                }]
            }
        }"#;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/MXN=X"))
            .respond_with(ResponseTemplate::new(200).set_body_string(quote))
            .mount(&mock_server)
            .await;

        // No INEGI token is configured, so the provider must never be called.
        Mock::given(method("GET"))
            .and(path_regex(r"^/INDICATOR/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn config_yaml(base_url: &str, data_path: &str) -> String {
        format!(
            r#"
credentials:
  banxico: "secret"
series:
  - id: SF43718
    title: "Tipo de cambio FIX"
    kind: currency
    currency: MXN
    decimals: 4
    periodicity: daily
  - id: "YF:MXN=X"
    title: "USD/MXN"
  - id: "INEGI:444612"
    title: "Desocupación"
providers:
  banxico:
    base_url: "{base_url}"
  yahoo:
    base_url: "{base_url}"
    delay_ms: 0
  inegi:
    base_url: "{base_url}"
    delay_ms: 0
refresh:
  mandatory: []
data_path: "{data_path}"
"#
        )
    }
}

#[test_log::test(tokio::test)]
async fn test_full_refresh_flow_with_mock() {
    let mock_server = test_utils::create_mock_server().await;
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(
        config_file.path(),
        test_utils::config_yaml(&mock_server.uri(), data_dir.path().to_str().unwrap()),
    )
    .expect("Failed to write config file");

    let app = sietrack::App::from_path(config_file.path().to_path_buf())
        .expect("Failed to build app");
    app.run(AppCommand::Refresh).await.expect("Refresh failed");

    let snapshot = app.store.load().await.unwrap();
    info!(?snapshot, "Cache after refresh");
    assert_eq!(snapshot.entries.len(), 3);
    assert!(snapshot.last_refresh.is_some());

    let fix = snapshot.get("SF43718").unwrap();
    assert_eq!(fix.value.as_deref(), Some("19.89"));
    assert_eq!(fix.date.as_deref(), Some("15/10/2024"));
    assert_eq!(fix.previous_value.as_deref(), Some("19.50"));

    let spot = snapshot.get("YF:MXN=X").unwrap();
    assert_eq!(spot.value.as_deref(), Some("20.25"));
    assert!(spot.error.is_none());

    let unemployment = snapshot.get("INEGI:444612").unwrap();
    assert!(unemployment.value.is_none());
    assert_eq!(
        unemployment.error.as_ref().unwrap().kind,
        EntryErrorKind::MissingCredential
    );

    app.run(AppCommand::Show).await.expect("Show failed");
    app.run(AppCommand::Calc(CalcCommand::UsdToMxn { amount: 100.0 }))
        .await
        .expect("Calc failed");
    // No UDI value was refreshed
    assert!(
        app.run(AppCommand::Calc(CalcCommand::UdiToMxn { amount: 1.0 }))
            .await
            .is_err()
    );
}

#[test_log::test(tokio::test)]
async fn test_volatility_check_with_mock() {
    let mock_server = test_utils::create_mock_server().await;
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(
        config_file.path(),
        test_utils::config_yaml(&mock_server.uri(), data_dir.path().to_str().unwrap()),
    )
    .expect("Failed to write config file");

    let app = sietrack::App::from_path(config_file.path().to_path_buf()).unwrap();
    let first = app.monitor.check().await.unwrap();
    assert_eq!(first.current, 20.25);
    assert!(first.previous.is_none());

    let second = app.monitor.check().await.unwrap();
    assert_eq!(second.previous, Some(20.25));
    assert!(!second.notified);

    app.run(AppCommand::CheckVolatility).await.unwrap();
}

#[test_log::test(tokio::test)]
async fn test_history_command_with_mock() {
    let mock_server = test_utils::create_mock_server().await;
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(
        config_file.path(),
        test_utils::config_yaml(&mock_server.uri(), data_dir.path().to_str().unwrap()),
    )
    .expect("Failed to write config file");

    let result = sietrack::run_command(
        AppCommand::History {
            ids: vec!["SF43718".to_string()],
            start: None,
            end: None,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_ok(), "History failed with: {:?}", result.err());

    // Every id failing is an error
    let result = sietrack::run_command(
        AppCommand::History {
            ids: vec!["INEGI:444612".to_string()],
            start: None,
            end: None,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    let result = sietrack::run_command(AppCommand::Show, Some(missing.to_str().unwrap())).await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}
