//! Core data models shared by the pipeline, the tracker and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::cache::Fingerprint;
use crate::publish::SkipReason;

/// Where the artifact of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSource {
    /// Served from the fingerprint cache; nothing was generated.
    Cache,
    /// Produced by the completion service.
    Remote,
    /// Produced by a local fallback template.
    Fallback,
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ArtifactSource::Cache => "cache",
            ArtifactSource::Remote => "remote",
            ArtifactSource::Fallback => "fallback",
        })
    }
}

/// Outcome of the optional publish stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Published {
        configuration_version_id: String,
        workspace_url: Option<String>,
    },
    Skipped(SkipReason),
    /// Publishing was attempted and failed; the local artifact is intact.
    Failed(String),
}

impl PublishStatus {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishStatus::Published { .. })
    }
}

/// Everything a single run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request: String,
    pub fingerprint: Fingerprint,
    pub source: ArtifactSource,
    /// Name of the fallback template, when one was used.
    pub template: Option<&'static str>,
    /// Final, normalized artifact.
    pub artifact: String,
    pub output_path: PathBuf,
    pub publish: PublishStatus,
    /// Tracking record written for this run, if writing it succeeded.
    pub tracking_path: Option<PathBuf>,
}
