//! Structural diff of normalized resource details

use crate::detail::ResourceDetail;
use crate::name::{ResourceName, Side};
use chrono::{DateTime, Utc};
use cloudsweep_common::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// How one JSON path differs between source and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Change {
    /// Present only in the target
    Added { value: Value },
    /// Present only in the source
    Removed { value: Value },
    Modified { source: Value, target: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// `/`-separated path from the record root
    pub path: String,
    #[serde(flatten)]
    pub change: Change,
}

/// Every difference found for one resource present in both environments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub kind: ResourceKind,
    pub name: ResourceName,
    pub entries: Vec<DiffEntry>,
}

/// A common name whose detail could not be fetched from one side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingResource {
    pub name: ResourceName,
    pub side: Side,
}

/// Machine-readable result of one analyzer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub kind: ResourceKind,
    /// Names whose details were fetched from both sides and diffed
    pub compared: usize,
    pub identical: usize,
    pub differences: Vec<ResourceDiff>,
    pub missing: Vec<MissingResource>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisReport {
    /// True when every compared resource matched and nothing went missing
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty() && self.missing.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} compared, {} identical, {} different, {} missing",
            self.kind,
            self.compared,
            self.identical,
            self.differences.len(),
            self.missing.len()
        )
    }
}

/// Compare two JSON trees.
///
/// Objects are compared key by key, arrays index by index. Entries are
/// ordered by path.
pub fn diff_values(source: &Value, target: &Value) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    walk(String::new(), source, target, &mut entries);
    entries
}

fn walk(path: String, source: &Value, target: &Value, out: &mut Vec<DiffEntry>) {
    match (source, target) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = format!("{path}/{}", escape(key));
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => walk(child, x, y, out),
                    (Some(x), None) => out.push(DiffEntry {
                        path: child,
                        change: Change::Removed { value: x.clone() },
                    }),
                    (None, Some(y)) => out.push(DiffEntry {
                        path: child,
                        change: Change::Added { value: y.clone() },
                    }),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                let child = format!("{path}/{i}");
                match (a.get(i), b.get(i)) {
                    (Some(x), Some(y)) => walk(child, x, y, out),
                    (Some(x), None) => out.push(DiffEntry {
                        path: child,
                        change: Change::Removed { value: x.clone() },
                    }),
                    (None, Some(y)) => out.push(DiffEntry {
                        path: child,
                        change: Change::Added { value: y.clone() },
                    }),
                    (None, None) => {}
                }
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(DiffEntry {
            path: if path.is_empty() { "/".to_string() } else { path },
            change: Change::Modified {
                source: a.clone(),
                target: b.clone(),
            },
        }),
    }
}

/// JSON pointer escaping for a single path segment
fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Accumulates the diffs produced during one analyzer run.
///
/// Owned by a single analyzer; there is one per run rather than one per
/// process.
#[derive(Debug)]
pub struct DiffReport {
    kind: ResourceKind,
    compared: usize,
    identical: usize,
    differences: Vec<ResourceDiff>,
    missing: Vec<MissingResource>,
}

impl DiffReport {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            compared: 0,
            identical: 0,
            differences: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Diff two normalized details of the listed resource `name`.
    ///
    /// Returns the recorded diff, or `None` when both sides are identical.
    pub fn record(
        &mut self,
        name: ResourceName,
        source: &ResourceDetail,
        target: &ResourceDetail,
    ) -> Option<&ResourceDiff> {
        self.compared += 1;
        let entries = diff_values(&source.to_value(), &target.to_value());
        if entries.is_empty() {
            self.identical += 1;
            return None;
        }
        self.differences.push(ResourceDiff {
            kind: self.kind,
            name,
            entries,
        });
        self.differences.last()
    }

    pub fn record_missing(&mut self, name: ResourceName, side: Side) {
        self.missing.push(MissingResource { name, side });
    }

    pub fn compared(&self) -> usize {
        self.compared
    }

    pub fn identical(&self) -> usize {
        self.identical
    }

    pub fn differences(&self) -> &[ResourceDiff] {
        &self.differences
    }

    pub fn missing(&self) -> &[MissingResource] {
        &self.missing
    }

    /// Cumulative text rendering of every difference so far
    pub fn render(&self) -> String {
        let mut out = String::new();
        for diff in &self.differences {
            render_diff(&mut out, diff);
        }
        for missing in &self.missing {
            let _ = writeln!(
                out,
                "! {}/{} not found in {}",
                self.kind, missing.name, missing.side
            );
        }
        out
    }

    /// Snapshot as a machine-readable report
    pub fn to_report(&self) -> AnalysisReport {
        AnalysisReport {
            kind: self.kind,
            compared: self.compared,
            identical: self.identical,
            differences: self.differences.clone(),
            missing: self.missing.clone(),
            generated_at: Utc::now(),
        }
    }

    pub fn into_report(self) -> AnalysisReport {
        AnalysisReport {
            kind: self.kind,
            compared: self.compared,
            identical: self.identical,
            differences: self.differences,
            missing: self.missing,
            generated_at: Utc::now(),
        }
    }
}

fn render_diff(out: &mut String, diff: &ResourceDiff) {
    let _ = writeln!(out, "--- source/{}/{}", diff.kind, diff.name);
    let _ = writeln!(out, "+++ target/{}/{}", diff.kind, diff.name);
    for entry in &diff.entries {
        match &entry.change {
            Change::Added { value } => {
                let _ = writeln!(out, "+ {}: {}", entry.path, value);
            }
            Change::Removed { value } => {
                let _ = writeln!(out, "- {}: {}", entry.path, value);
            }
            Change::Modified { source, target } => {
                let _ = writeln!(out, "- {}: {}", entry.path, source);
                let _ = writeln!(out, "+ {}: {}", entry.path, target);
            }
        }
    }
}
