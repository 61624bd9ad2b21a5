//! Publishing to a Terraform Cloud workspace.
//!
//! The upload protocol has two steps, preceded by a workspace lookup when
//! the workspace is configured by name:
//!
//! ```text
//! GET  {api}/organizations/{org}/workspaces/{name}     → workspace id
//! POST {api}/workspaces/{id}/configuration-versions    → upload-url
//! PUT  {upload-url}   (tar.gz containing main.tf)
//! ```
//!
//! All requests except the upload carry the `TF_API_TOKEN` bearer token.
//! Missing credentials skip publishing entirely; that is not an error.
//! A failure at any step is returned to the caller and never touches the
//! local artifact.

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{PublishError, PublishStep};

/// File name of the artifact inside the uploaded archive.
pub const ARCHIVE_ENTRY: &str = "main.tf";

const JSON_API: &str = "application/vnd.api+json";

/// Result of a publish attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published {
        configuration_version_id: String,
        /// Browser URL of the workspace, when the organization is known.
        workspace_url: Option<String>,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `TF_API_TOKEN` is not set.
    MissingToken,
    /// The workspace is given by name but no organization is configured.
    MissingOrganization,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::MissingToken => "no TF_API_TOKEN configured",
            SkipReason::MissingOrganization => {
                "workspace given by name but no organization configured"
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct JsonApiDocument<A> {
    data: JsonApiResource<A>,
}

#[derive(Debug, Deserialize)]
struct JsonApiResource<A> {
    id: String,
    attributes: A,
}

#[derive(Debug, Deserialize)]
struct ConfigurationVersionAttributes {
    #[serde(rename = "upload-url")]
    upload_url: Option<String>,
}

/// Upload `artifact` as a new configuration version of the configured
/// workspace.
pub fn publish(artifact: &str, settings: &Settings) -> Result<PublishOutcome, PublishError> {
    let Some(token) = settings.credentials.tf_api_token.as_deref() else {
        return Ok(PublishOutcome::Skipped(SkipReason::MissingToken));
    };
    let workspace = settings.workspace_target();
    let organization = settings.organization();
    let config = &settings.config.workspace;
    let api_url = config.api_url.trim_end_matches('/');

    let client = Client::new();

    let workspace_id = if workspace.starts_with("ws-") {
        workspace.to_string()
    } else {
        let Some(org) = organization else {
            return Ok(PublishOutcome::Skipped(SkipReason::MissingOrganization));
        };
        resolve_workspace_id(&client, api_url, token, org, workspace)?
    };

    info!(workspace = %workspace_id, "creating configuration version");
    let body = serde_json::json!({
        "data": {
            "type": "configuration-versions",
            "attributes": {
                "auto-queue-runs": config.auto_queue_runs,
                "speculative": config.speculative,
            }
        }
    });
    let step = PublishStep::CreateVersion;
    let response = client
        .post(format!(
            "{}/workspaces/{}/configuration-versions",
            api_url, workspace_id
        ))
        .bearer_auth(token)
        .header(CONTENT_TYPE, JSON_API)
        .body(body.to_string())
        .send()
        .map_err(|source| PublishError::Transport { step, source })?;
    let version: JsonApiDocument<ConfigurationVersionAttributes> =
        read_json(check_status(response, step)?, step)?;
    let upload_url = version
        .data
        .attributes
        .upload_url
        .ok_or_else(|| PublishError::MalformedResponse {
            step,
            detail: "missing data.attributes.upload-url".to_string(),
        })?;

    let archive = build_archive(artifact)?;
    debug!(bytes = archive.len(), "uploading configuration archive");
    let step = PublishStep::Upload;
    let response = client
        .put(&upload_url)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(archive)
        .send()
        .map_err(|source| PublishError::Transport { step, source })?;
    check_status(response, step)?;

    let workspace_url = organization.map(|org| {
        format!(
            "{}/{}/workspaces/{}",
            config.app_url.trim_end_matches('/'),
            org,
            workspace
        )
    });

    Ok(PublishOutcome::Published {
        configuration_version_id: version.data.id,
        workspace_url,
    })
}

fn resolve_workspace_id(
    client: &Client,
    api_url: &str,
    token: &str,
    organization: &str,
    name: &str,
) -> Result<String, PublishError> {
    let step = PublishStep::ResolveWorkspace;
    debug!(organization, name, "resolving workspace id");
    let response = client
        .get(format!(
            "{}/organizations/{}/workspaces/{}",
            api_url, organization, name
        ))
        .bearer_auth(token)
        .header(CONTENT_TYPE, JSON_API)
        .send()
        .map_err(|source| PublishError::Transport { step, source })?;
    let workspace: JsonApiDocument<serde::de::IgnoredAny> =
        read_json(check_status(response, step)?, step)?;
    Ok(workspace.data.id)
}

fn check_status(response: Response, step: PublishStep) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PublishError::Status {
        step,
        status: status.as_u16(),
        body,
    })
}

fn read_json<T: DeserializeOwned>(response: Response, step: PublishStep) -> Result<T, PublishError> {
    response
        .json()
        .map_err(|e| PublishError::MalformedResponse {
            step,
            detail: e.to_string(),
        })
}

/// Package `artifact` as a gzip-compressed tarball whose only entry is
/// [`ARCHIVE_ENTRY`].
pub fn build_archive(artifact: &str) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_path(ARCHIVE_ENTRY)?;
    header.set_size(artifact.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    archive.append(&header, artifact.as_bytes())?;

    archive.into_inner()?.finish()
}
