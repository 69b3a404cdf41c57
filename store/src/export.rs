//! Portable snapshot of a store, with JSON, YAML and Markdown renderings.
//!
//! JSON and YAML are machine formats and parse back into an [`ExportBundle`].
//! Markdown is a read-only report. Identical bundles render to identical
//! bytes in every format.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Metric, Workout};
use crate::persistence::PersistenceError;
use crate::timestamp;

pub const EXPORT_VERSION: &str = "1.0";
pub const EXPORT_TOOL: &str = "health";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub version: String,
    #[serde(with = "timestamp")]
    pub exported_at: DateTime<Utc>,
    pub tool: String,
    pub metrics: Vec<Metric>,
    /// Each workout carries its metrics.
    pub workouts: Vec<Workout>,
}

/// YAML layout: metrics grouped under their type.
#[derive(Serialize, Deserialize)]
struct YamlBundle {
    version: String,
    #[serde(with = "timestamp")]
    exported_at: DateTime<Utc>,
    tool: String,
    #[serde(default)]
    metrics: BTreeMap<String, Vec<Metric>>,
    #[serde(default)]
    workouts: Vec<Workout>,
}

impl ExportBundle {
    pub fn new(metrics: Vec<Metric>, workouts: Vec<Workout>) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            tool: EXPORT_TOOL.to_string(),
            metrics,
            workouts,
        }
    }

    pub fn workout_metric_count(&self) -> usize {
        self.workouts.iter().map(|w| w.metrics.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, PersistenceError> {
        let bundle: Self = serde_json::from_str(raw)?;
        check_version(&bundle.version)?;
        Ok(bundle)
    }

    pub fn to_yaml(&self) -> Result<String, PersistenceError> {
        let mut grouped: BTreeMap<String, Vec<Metric>> = BTreeMap::new();
        for metric in &self.metrics {
            grouped
                .entry(metric.metric_type.as_str().to_string())
                .or_default()
                .push(metric.clone());
        }

        let yaml = YamlBundle {
            version: self.version.clone(),
            exported_at: self.exported_at,
            tool: self.tool.clone(),
            metrics: grouped,
            workouts: self.workouts.clone(),
        };
        Ok(serde_yaml::to_string(&yaml)?)
    }

    /// Parse a YAML export. Grouped metrics are flattened back into one list,
    /// newest first, which is the order a repository lists them in.
    pub fn from_yaml(raw: &str) -> Result<Self, PersistenceError> {
        let yaml: YamlBundle = serde_yaml::from_str(raw)?;
        check_version(&yaml.version)?;

        let mut metrics: Vec<Metric> = yaml.metrics.into_values().flatten().collect();
        metrics.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(Self {
            version: yaml.version,
            exported_at: yaml.exported_at,
            tool: yaml.tool,
            metrics,
            workouts: yaml.workouts,
        })
    }

    /// Human-readable report: one table per metric type, then the workouts.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Health Export\n");
        let _ = writeln!(out, "Exported: {}\n", timestamp::format(&self.exported_at));

        let mut grouped: BTreeMap<&str, Vec<&Metric>> = BTreeMap::new();
        for metric in &self.metrics {
            grouped.entry(metric.metric_type.as_str()).or_default().push(metric);
        }

        if !grouped.is_empty() {
            let _ = writeln!(out, "## Metrics\n");
        }
        for (metric_type, metrics) in &grouped {
            let _ = writeln!(out, "### {metric_type}\n");
            let _ = writeln!(out, "| Recorded | Value | Unit | Notes | ID |");
            let _ = writeln!(out, "|---|---|---|---|---|");
            for m in metrics {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    timestamp::format(&m.recorded_at),
                    m.value,
                    cell(&m.unit),
                    cell(m.notes.as_deref().unwrap_or_default()),
                    short(&m.id),
                );
            }
            out.push('\n');
        }

        if !self.workouts.is_empty() {
            let _ = writeln!(out, "## Workouts\n");
            let _ = writeln!(out, "| Started | Type | Duration (min) | Metrics | Notes | ID |");
            let _ = writeln!(out, "|---|---|---|---|---|---|");
            for w in &self.workouts {
                let metrics = w
                    .metrics
                    .iter()
                    .map(|m| match &m.unit {
                        Some(unit) => format!("{} {} {}", m.metric_name, m.value, unit),
                        None => format!("{} {}", m.metric_name, m.value),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    timestamp::format(&w.started_at),
                    cell(&w.workout_type),
                    w.duration_minutes.map(|d| d.to_string()).unwrap_or_default(),
                    cell(&metrics),
                    cell(w.notes.as_deref().unwrap_or_default()),
                    short(&w.id),
                );
            }
        }

        out
    }
}

fn check_version(version: &str) -> Result<(), PersistenceError> {
    if version != EXPORT_VERSION {
        return Err(PersistenceError::Validation(format!(
            "unsupported export version {version:?} (expected {EXPORT_VERSION})"
        )));
    }
    Ok(())
}

/// Table cell text: pipes escaped, line breaks flattened.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
