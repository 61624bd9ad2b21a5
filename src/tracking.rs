//! Deployment tracking and the cost report.
//!
//! Each run leaves a small JSON record in the tracking directory
//! (`<tracking_dir>/<fingerprint>.json`, rewritten when the same request is
//! run again). `promptinfra costs` reads those records back and prints a
//! rough monthly cost overview. Estimates are deliberately coarse: a fixed
//! monthly price per resource type, and per instance type for EC2.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::Config;
use crate::hcl::Document;
use crate::models::{ArtifactSource, RunReport};

/// Approximate monthly USD price of an EC2 instance type.
const INSTANCE_PRICES: &[(&str, f64)] = &[
    ("t2.micro", 8.50),
    ("t2.small", 17.00),
    ("t2.medium", 34.00),
];

/// Approximate monthly USD price per resource, by resource type.
const RESOURCE_PRICES: &[(&str, f64)] = &[
    ("aws_ebs_volume", 0.80),
    ("aws_s3_bucket", 2.00),
    ("aws_db_instance", 15.00),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub fingerprint: String,
    pub request: String,
    pub created_at: DateTime<Utc>,
    pub source: ArtifactSource,
    pub resource_count: usize,
    pub resource_types: Vec<String>,
    pub estimated_monthly_cost: f64,
    pub published: bool,
}

impl DeploymentRecord {
    pub fn from_report(report: &RunReport, created_at: DateTime<Utc>) -> Self {
        let doc = Document::parse(&report.artifact);
        let resources = doc.resources();
        Self {
            fingerprint: report.fingerprint.to_string(),
            request: report.request.clone(),
            created_at,
            source: report.source,
            resource_count: resources.len(),
            resource_types: resources.into_iter().map(|r| r.resource_type).collect(),
            estimated_monthly_cost: estimate_monthly_cost(&report.artifact),
            published: report.publish.is_published(),
        }
    }
}

/// Rough monthly cost of the resources declared in `artifact`, in USD.
pub fn estimate_monthly_cost(artifact: &str) -> f64 {
    let doc = Document::parse(artifact);
    let total: f64 = doc
        .resources()
        .iter()
        .map(|block| {
            if block.resource_type == "aws_instance" {
                doc.string_attribute(block, "instance_type")
                    .and_then(|t| lookup(INSTANCE_PRICES, t))
                    .unwrap_or(0.0)
            } else {
                lookup(RESOURCE_PRICES, &block.resource_type).unwrap_or(0.0)
            }
        })
        .sum();
    (total * 100.0).round() / 100.0
}

fn lookup(table: &[(&str, f64)], key: &str) -> Option<f64> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Write `record` to `<dir>/<fingerprint>.json`.
pub fn save_record(dir: &Path, record: &DeploymentRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create tracking directory: {}", dir.display()))?;
    let path = dir.join(format!("{}.json", record.fingerprint));
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write tracking record: {}", path.display()))?;
    Ok(path)
}

/// Read every record in `dir`, oldest first. A missing directory yields no
/// records; unreadable or malformed files are skipped with a warning.
pub fn load_records(dir: &Path) -> Result<Vec<DeploymentRecord>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read tracking directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| Ok(serde_json::from_str::<DeploymentRecord>(&s)?));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping tracking record"),
        }
    }

    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(records)
}

/// Run the `costs` command: print tracked deployments and their estimated
/// monthly cost.
pub fn run_costs(config: &Config) -> Result<()> {
    let dir = &config.paths.tracking_dir;
    let records = load_records(dir)?;

    println!("PromptInfra — Tracked Deployments");
    println!("=================================");
    println!();

    if records.is_empty() {
        println!("  No deployments tracked in {}", dir.display());
        println!("  Run `promptinfra generate \"<request>\"` first.");
        return Ok(());
    }

    println!(
        "  {:<16} {:<10} {:<8} {:>9} {:>10}   {}",
        "FINGERPRINT", "CREATED", "SOURCE", "RESOURCES", "EST/MONTH", "REQUEST"
    );
    println!("  {}", "-".repeat(90));

    let mut total_resources = 0;
    let mut total_cost = 0.0;
    for r in &records {
        total_resources += r.resource_count;
        total_cost += r.estimated_monthly_cost;
        println!(
            "  {:<16} {:<10} {:<8} {:>9} {:>10}   {}{}",
            r.fingerprint,
            r.created_at.format("%Y-%m-%d"),
            r.source,
            r.resource_count,
            format!("${:.2}", r.estimated_monthly_cost),
            truncate(&r.request, 40),
            if r.published { " (published)" } else { "" }
        );
    }

    println!();
    println!("  Deployments: {}", records.len());
    println!("  Resources:   {}", total_resources);
    println!("  Estimated:   ${:.2} / month", total_cost);
    println!();
    println!(
        "  Filter your cloud cost tooling by tag ManagedBy={} for actual spend.",
        config.tags.owner
    );

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}
