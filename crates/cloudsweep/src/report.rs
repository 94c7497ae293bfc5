//! Rendering of reconcile and inventory results

use anyhow::{Context, Result};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use cloudsweep_common::ResourceKind;
use cloudsweep_reconcile::{Change, PipelineOutcome, ResourceName};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::Path;

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Names listed for one kind in one environment
#[derive(Debug, Clone, Serialize)]
pub struct InventoryListing {
    pub kind: ResourceKind,
    pub account_id: String,
    pub region: String,
    pub names: Vec<ResourceName>,
}

fn compact_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

/// Human-readable rendering of a finished run
pub fn render_table(outcome: &PipelineOutcome) -> String {
    let report = &outcome.report;
    let mut out = String::new();

    let mut counts = new_table(&["Listed / compared", "Count"]);
    for (label, count) in [
        ("Source listed", outcome.source_listed),
        ("Target listed", outcome.target_listed),
        ("In both", outcome.matched),
        ("Identical", report.identical),
        ("Different", report.differences.len()),
        ("Missing", report.missing.len()),
        ("Source only", outcome.source_only.len()),
        ("Target only", outcome.target_only.len()),
    ] {
        counts.add_row(vec![Cell::new(label), Cell::new(count)]);
    }
    let _ = writeln!(out, "{counts}");

    if !report.differences.is_empty() {
        let mut table = new_table(&["Name", "Path", "Change", "Value"]);
        for diff in &report.differences {
            for entry in &diff.entries {
                let (op, value) = match &entry.change {
                    Change::Added { value } => ("added", compact_json(value)),
                    Change::Removed { value } => ("removed", compact_json(value)),
                    Change::Modified { source, target } => (
                        "modified",
                        format!("{} -> {}", compact_json(source), compact_json(target)),
                    ),
                };
                table.add_row(vec![
                    Cell::new(diff.name.as_str()),
                    Cell::new(&entry.path),
                    Cell::new(op),
                    Cell::new(&value),
                ]);
            }
        }
        let _ = writeln!(out, "\n=== Differences ===\n\n{table}");
    }

    if !report.missing.is_empty() {
        let mut table = new_table(&["Name", "Missing from"]);
        for missing in &report.missing {
            table.add_row(vec![Cell::new(missing.name.as_str()), Cell::new(missing.side)]);
        }
        let _ = writeln!(out, "\n=== Missing at detail fetch ===\n\n{table}");
    }

    if !outcome.source_only.is_empty() || !outcome.target_only.is_empty() {
        let unmatched = outcome
            .source_only
            .iter()
            .map(|name| (name, "source"))
            .chain(outcome.target_only.iter().map(|name| (name, "target")));
        let mut table = new_table(&["Name", "Only in"]);
        for (name, side) in unmatched {
            table.add_row(vec![Cell::new(name), Cell::new(side)]);
        }
        let _ = writeln!(out, "\n=== Unmatched ===\n\n{table}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.summary());
    out
}

pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

/// Render a run in the requested format
pub fn render_outcome(outcome: &PipelineOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(outcome)),
        OutputFormat::Json => render_json(outcome),
    }
}

/// Render one environment's listing in the requested format
pub fn render_inventory(listing: &InventoryListing, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(listing),
        OutputFormat::Table => {
            let mut table = new_table(&["Kind", "Account", "Region", "Name"]);
            for name in &listing.names {
                table.add_row(vec![
                    Cell::new(listing.kind),
                    Cell::new(&listing.account_id),
                    Cell::new(&listing.region),
                    Cell::new(name),
                ]);
            }
            Ok(format!("{table}\n\n{} {}(s)\n", listing.names.len(), listing.kind))
        }
    }
}

/// Write the JSON report of a run to a file
pub fn write_json_report(path: &Path, outcome: &PipelineOutcome) -> Result<()> {
    let json = render_json(outcome)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsweep_reconcile::{AnalysisReport, DiffEntry, MissingResource, ResourceDiff, Side};
    use serde_json::json;

    fn outcome() -> PipelineOutcome {
        PipelineOutcome {
            report: AnalysisReport {
                kind: ResourceKind::Queue,
                compared: 2,
                identical: 1,
                differences: vec![ResourceDiff {
                    kind: ResourceKind::Queue,
                    name: ResourceName::from("orders"),
                    entries: vec![DiffEntry {
                        path: "/Attributes/VisibilityTimeout".into(),
                        change: Change::Modified {
                            source: json!("30"),
                            target: json!("60"),
                        },
                    }],
                }],
                missing: vec![MissingResource {
                    name: ResourceName::from("audit"),
                    side: Side::Target,
                }],
                generated_at: chrono::Utc::now(),
            },
            source_listed: 4,
            target_listed: 3,
            matched: 3,
            source_only: vec![ResourceName::from("legacy")],
            target_only: Vec::new(),
        }
    }

    #[test]
    fn test_render_table() {
        let text = render_table(&outcome());

        assert!(text.contains("/Attributes/VisibilityTimeout"));
        assert!(text.contains("30 -> 60"));
        assert!(text.contains("audit"));
        assert!(text.contains("Unmatched"));
        assert!(text.contains("legacy"));
        assert!(text.ends_with("queue: 2 compared, 1 identical, 1 different, 1 missing\n"));
    }

    #[test]
    fn test_render_json() {
        let text = render_outcome(&outcome(), OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["matched"], 3);
        assert_eq!(value["report"]["kind"], "queue");
        assert_eq!(value["report"]["differences"][0]["entries"][0]["op"], "modified");
        assert_eq!(value["source_only"][0], "legacy");
    }

    #[test]
    fn test_write_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_report(&path, &outcome()).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["report"]["missing"][0]["side"], "target");
    }

    #[test]
    fn test_render_inventory_table() {
        let listing = InventoryListing {
            kind: ResourceKind::Topic,
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            names: vec![ResourceName::from("alerts"), ResourceName::from("billing")],
        };
        let text = render_inventory(&listing, OutputFormat::Table).unwrap();
        assert!(text.contains("alerts"));
        assert!(text.ends_with("2 topic(s)\n"));
    }
}
