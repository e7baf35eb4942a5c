use super::ui;
use crate::core::cache::{CacheEntry, CacheSnapshot, CacheStore};
use crate::core::indicator::{IndicatorDescriptor, Registry, ValueKind};
use crate::core::observation::parse_value;
use anyhow::Result;
use comfy_table::Cell;

/// Formats a raw cached value according to its descriptor. Values that do
/// not parse are shown as they came.
pub fn format_value(raw: &str, descriptor: Option<&IndicatorDescriptor>) -> String {
    let Some(number) = parse_value(raw) else {
        return raw.to_string();
    };
    let Some(descriptor) = descriptor else {
        return format!("{number}");
    };
    let decimals = descriptor.decimals as usize;
    match descriptor.kind {
        ValueKind::Number => format!("{number:.decimals$}"),
        ValueKind::Percent => format!("{number:.decimals$}%"),
        ValueKind::Currency => match &descriptor.currency {
            Some(code) => format!("{number:.decimals$} {code}"),
            None => format!("{number:.decimals$}"),
        },
    }
}

fn status_cell(entry: &CacheEntry) -> Cell {
    match &entry.error {
        None => Cell::new(ui::style_text("ok", ui::StyleType::Subtle)),
        Some(error) if entry.stale => Cell::new(ui::style_text(
            &format!("stale: {}", error.message),
            ui::StyleType::Warning,
        )),
        Some(error) => Cell::new(ui::style_text(&error.message, ui::StyleType::Error)),
    }
}

pub fn render_snapshot(snapshot: &CacheSnapshot, registry: &Registry) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Indicator"),
        ui::header_cell("Value"),
        ui::header_cell("Date"),
        ui::header_cell("Previous"),
        ui::header_cell("Change"),
        ui::header_cell("Status"),
    ]);

    // Registry order first, then anything else still cached.
    let mut ids: Vec<&str> = registry.indicators().iter().map(|i| i.id()).collect();
    ids.extend(registry.unresolved().iter().map(String::as_str));
    for id in snapshot.entries.keys() {
        if !ids.contains(&id.as_str()) {
            ids.push(id);
        }
    }

    for id in ids {
        let Some(entry) = snapshot.get(id) else {
            continue;
        };
        let descriptor = registry.find(id).map(|i| &i.descriptor);
        let name = descriptor
            .map(|d| d.title.as_str())
            .filter(|t| !t.is_empty())
            .or(entry.title.as_deref())
            .unwrap_or(id);

        let value = match &entry.value {
            Some(raw) => ui::right_cell(format_value(raw, descriptor)),
            None => ui::na_cell(entry.error.is_some()),
        };
        let previous = ui::format_optional_cell(entry.previous_value.as_deref(), |raw| {
            format_value(raw, descriptor)
        });
        let change = entry.variation.map_or_else(|| ui::na_cell(false), ui::change_cell);

        table.add_row(vec![
            Cell::new(name),
            value,
            Cell::new(entry.date.as_deref().unwrap_or("")),
            previous,
            change,
            status_cell(entry),
        ]);
    }

    let last_refresh = snapshot.last_refresh.map_or("never".to_string(), |t| {
        t.with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    });
    let mut output = format!(
        "{} {}\n\n",
        ui::style_text("Last refresh:", ui::StyleType::Label),
        last_refresh
    );
    output.push_str(&table.to_string());
    for notice in &snapshot.notices {
        output.push_str(&format!("\n{}", ui::style_text(notice, ui::StyleType::Warning)));
    }
    output
}

pub async fn run(store: &CacheStore, registry: &Registry) -> Result<()> {
    let snapshot = store.load().await?;
    if snapshot.entries.is_empty() {
        println!("Cache is empty, run `sietrack refresh` first.");
        return Ok(());
    }
    println!("{}", render_snapshot(&snapshot, registry));
    Ok(())
}
