use super::ui;
use crate::core::observation::{DateRange, Observation, percent_change};
use crate::service::{CommandService, Request, Response};
use anyhow::{Result, bail};
use comfy_table::Cell;
use futures::future::join_all;

pub fn render_observations(id: &str, observations: &[Observation]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Value"),
        ui::header_cell("Change"),
    ]);

    let mut prior: Option<f64> = None;
    for observation in observations {
        let current = observation.numeric();
        let change = match (current, prior) {
            (Some(c), Some(p)) => percent_change(c, p),
            _ => None,
        };
        table.add_row(vec![
            Cell::new(&observation.date),
            ui::right_cell(observation.value.clone()),
            change.map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
        if current.is_some() {
            prior = current;
        }
    }

    format!(
        "{} ({} observations)\n\n{}",
        ui::style_text(id, ui::StyleType::Title),
        observations.len(),
        table
    )
}

/// Fetches every id concurrently and prints one table per id.
pub async fn run(service: &CommandService, ids: &[String], range: Option<DateRange>) -> Result<()> {
    let pb = ui::new_progress_bar(ids.len() as u64, "Fetching history...");
    let requests = ids.iter().map(|id| {
        let pb = pb.clone();
        async move {
            let response = service
                .handle(Request::Historical {
                    id: id.clone(),
                    range,
                })
                .await;
            pb.inc(1);
            (id, response)
        }
    });
    let responses = join_all(requests).await;
    pb.finish_and_clear();

    let mut failures = 0;
    for (id, response) in responses {
        match response {
            Response::Observations { observations, .. } => {
                println!("{}\n", render_observations(id, &observations));
            }
            Response::Error(message) => {
                failures += 1;
                println!(
                    "{}: {}\n",
                    ui::style_text(id, ui::StyleType::Label),
                    ui::style_text(&message, ui::StyleType::Error)
                );
            }
            Response::Refreshed(_) => {}
        }
    }

    if failures == ids.len() && !ids.is_empty() {
        bail!("No history could be fetched");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_observations_computes_step_changes() {
        let observations = vec![
            Observation::new("01/10/2024", "20.00"),
            Observation::new("02/10/2024", "N/E"),
            Observation::new("03/10/2024", "20.50"),
        ];
        let output =
            console::strip_ansi_codes(&render_observations("SF43718", &observations)).to_string();
        assert!(output.contains("SF43718 (3 observations)"));
        assert!(output.contains("+2.50%"));
        assert!(output.contains("N/E"));
    }
}
