//! The generation pipeline.
//!
//! One request is processed synchronously, start to finish:
//!
//! ```text
//! CacheCheck ──hit──────────────────────────┐
//!     │ miss                                ▼
//!     ▼                                Normalizing ──▶ Persisting ──▶ Publishing ──▶ Tracking
//! Generating ──(remote | fallback)──────────┘                          (optional)
//! ```
//!
//! - A generation failure is absorbed: the fallback template is used and the
//!   caller only ever sees an artifact.
//! - A publish failure is reported in [`RunReport::publish`] and logged as a
//!   warning; the run still succeeds.
//! - Failing to write the cache entry or the output file aborts the run.
//! - The tracking record is written last so it can store the publish
//!   outcome; failing to write it is only a warning.
//!
//! Nothing is retried.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use std::path::Path;
use tracing::{info, info_span, warn};

use crate::cache::{compute_fingerprint, FingerprintCache};
use crate::config::Settings;
use crate::error::GenerateError;
use crate::generator;
use crate::models::{ArtifactSource, PublishStatus, RunReport};
use crate::publish::{self, PublishOutcome};
use crate::tags::{self, TagPolicy};
use crate::templates;
use crate::tracking::{self, DeploymentRecord};

/// Process `request` using today's date for the `CreatedAt` tag.
pub fn run(settings: &Settings, request: &str) -> Result<RunReport> {
    run_on(settings, request, Local::now().date_naive())
}

/// Process `request` as of `today`.
pub fn run_on(settings: &Settings, request: &str, today: NaiveDate) -> Result<RunReport> {
    let fingerprint = compute_fingerprint(request);
    let _span = info_span!("run", fingerprint = %fingerprint).entered();
    info!(request, "processing request");

    let config = &settings.config;
    let cache = FingerprintCache::new(&config.paths.cache_dir);
    let policy = TagPolicy::from_config(&config.tags, today);

    let cached = match cache.lookup(&fingerprint) {
        Ok(hit) => hit,
        Err(e) => {
            warn!(error = %e, "cache entry unreadable; regenerating");
            None
        }
    };

    let (raw, source, template) = match cached {
        Some(artifact) => {
            info!("using cached artifact");
            (artifact, ArtifactSource::Cache, None)
        }
        None => generate(settings, request),
    };

    let artifact = tags::normalize(&raw, &policy);

    if source != ArtifactSource::Cache {
        let path = cache.store(&fingerprint, &artifact)?;
        info!(path = %path.display(), "cached artifact");
    }
    write_output(&config.paths.output, &artifact)?;
    info!(path = %config.paths.output.display(), "wrote artifact");

    let publish = match publish::publish(&artifact, settings) {
        Ok(PublishOutcome::Published {
            configuration_version_id,
            workspace_url,
        }) => {
            info!(configuration_version = %configuration_version_id, "published to workspace");
            PublishStatus::Published {
                configuration_version_id,
                workspace_url,
            }
        }
        Ok(PublishOutcome::Skipped(reason)) => {
            info!(%reason, "publish skipped");
            PublishStatus::Skipped(reason)
        }
        Err(e) => {
            warn!(error = %e, "publish failed; local artifact kept");
            PublishStatus::Failed(e.to_string())
        }
    };

    let mut report = RunReport {
        request: request.to_string(),
        fingerprint,
        source,
        template,
        artifact,
        output_path: config.paths.output.clone(),
        publish,
        tracking_path: None,
    };

    let record = DeploymentRecord::from_report(&report, Utc::now());
    match tracking::save_record(&config.paths.tracking_dir, &record) {
        Ok(path) => report.tracking_path = Some(path),
        Err(e) => warn!(error = %e, "could not write tracking record"),
    }

    Ok(report)
}

/// Produce a raw artifact: remote first, fallback template otherwise.
fn generate(settings: &Settings, request: &str) -> (String, ArtifactSource, Option<&'static str>) {
    let api_key = settings.credentials.openai_api_key.as_deref();
    match generator::generate(request, api_key, &settings.config.generator) {
        Ok(code) => {
            info!("generated artifact remotely");
            return (code, ArtifactSource::Remote, None);
        }
        Err(GenerateError::MissingApiKey) => {
            info!("no completion API key; using fallback template");
        }
        Err(e) => {
            warn!(error = %e, "remote generation failed; using fallback template");
        }
    }

    let rule = templates::select_rule(request);
    info!(template = rule.name, "selected fallback template");
    let artifact = rule.render(&settings.config.templates.region);
    (artifact, ArtifactSource::Fallback, Some(rule.name))
}

fn write_output(path: &Path, artifact: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    std::fs::write(path, artifact)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))
}
