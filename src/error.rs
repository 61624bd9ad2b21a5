//! Typed failures of the two remote adapters.
//!
//! Both are routine outcomes rather than fatal errors: the pipeline turns a
//! [`GenerateError`] into a fallback template and a [`PublishError`] into a
//! warning. Local I/O failures are not represented here; they travel as
//! `anyhow::Error` and abort the run.

use std::fmt;
use thiserror::Error;

/// Why remote generation produced no artifact.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("no completion API key configured")]
    MissingApiKey,

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("completion contained no Terraform code")]
    NoCode,
}

/// The step of the workspace upload protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    ResolveWorkspace,
    CreateVersion,
    Upload,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublishStep::ResolveWorkspace => "workspace lookup",
            PublishStep::CreateVersion => "configuration version creation",
            PublishStep::Upload => "configuration upload",
        })
    }
}

/// Why publishing to the remote workspace failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{step} request failed: {source}")]
    Transport {
        step: PublishStep,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step} returned HTTP {status}: {body}")]
    Status {
        step: PublishStep,
        status: u16,
        body: String,
    },

    #[error("malformed {step} response: {detail}")]
    MalformedResponse { step: PublishStep, detail: String },

    #[error("failed to build configuration archive: {0}")]
    Archive(#[from] std::io::Error),
}

impl PublishError {
    pub fn step(&self) -> Option<PublishStep> {
        match self {
            PublishError::Transport { step, .. }
            | PublishError::Status { step, .. }
            | PublishError::MalformedResponse { step, .. } => Some(*step),
            PublishError::Archive(_) => None,
        }
    }
}
