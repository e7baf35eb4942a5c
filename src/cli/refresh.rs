use super::ui;
use crate::refresh::RefreshReport;
use crate::service::{CommandService, Request, Response};
use crate::volatility::VolatilityCheck;
use anyhow::{Result, bail};

pub fn render_report(report: &RefreshReport) -> String {
    let mut output = format!(
        "{} {} updated, {} failed",
        ui::style_text("Refresh complete:", ui::StyleType::Label),
        ui::style_text(&report.updated.to_string(), ui::StyleType::Value),
        report.failed
    );
    if report.pruned > 0 {
        output.push_str(&format!(", {} removed", report.pruned));
    }
    for kind in &report.unconfigured {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(&format!("{kind}: no credential configured"), ui::StyleType::Subtle)
        ));
    }
    for kind in &report.rate_limited {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(&format!("{kind}: rate limit reached"), ui::StyleType::Warning)
        ));
    }
    output
}

pub async fn run(service: &CommandService) -> Result<()> {
    let spinner = ui::new_spinner("Refreshing indicators...");
    let response = service.handle(Request::Refresh).await;
    spinner.finish_and_clear();

    match response {
        Response::Refreshed(report) => {
            println!("{}", render_report(&report));
            Ok(())
        }
        Response::Error(message) => bail!(message),
        Response::Observations { .. } => bail!("Unexpected response to refresh request"),
    }
}

pub fn render_volatility(check: &VolatilityCheck) -> String {
    let change = check
        .variation
        .map_or("no baseline yet".to_string(), |v| format!("{v:+.2}%"));
    let status = if check.notified {
        ui::style_text("ALERT", ui::StyleType::Error)
    } else {
        ui::style_text("ok", ui::StyleType::Subtle)
    };
    format!(
        "{} {:.4} ({change}) {status}",
        ui::style_text(&check.indicator, ui::StyleType::Label),
        check.current
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicator::SourceKind;

    #[test]
    fn test_render_report() {
        let report = RefreshReport {
            updated: 5,
            failed: 2,
            pruned: 1,
            rate_limited: vec![SourceKind::Inegi],
            unconfigured: vec![SourceKind::Yahoo],
        };
        let output = console::strip_ansi_codes(&render_report(&report)).to_string();
        assert!(output.starts_with("Refresh complete: 5 updated, 2 failed, 1 removed"));
        assert!(output.contains("Yahoo: no credential configured"));
        assert!(output.contains("INEGI: rate limit reached"));
    }

    #[test]
    fn test_render_volatility() {
        let check = VolatilityCheck {
            indicator: "YF:MXN=X".to_string(),
            previous: Some(20.0),
            current: 20.25,
            variation: Some(1.25),
            notified: true,
        };
        let output = console::strip_ansi_codes(&render_volatility(&check)).to_string();
        assert_eq!(output, "YF:MXN=X 20.2500 (+1.25%) ALERT");
    }
}
