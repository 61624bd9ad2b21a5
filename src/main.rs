//! # PromptInfra CLI (`promptinfra`)
//!
//! ## Usage
//!
//! ```bash
//! promptinfra [--config promptinfra.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `promptinfra generate <request...>` | Produce `main.tf` for a request and optionally publish it |
//! | `promptinfra costs` | Show tracked deployments and estimated monthly cost |
//!
//! ## Environment
//!
//! | Variable | Effect when set |
//! |----------|-----------------|
//! | `OPENAI_API_KEY` | Generate with the completion service instead of templates |
//! | `TF_API_TOKEN` | Upload the result to Terraform Cloud |
//! | `TF_ORGANIZATION` | Organization used to resolve the workspace by name |
//! | `TF_WORKSPACE` | Workspace name or `ws-` id |
//! | `AWS_REGION` | Region written into fallback templates |
//! | `PROMPTINFRA_LOG` | Log filter (default `info`) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use promptinfra::config::{self, Settings};
use promptinfra::models::{PublishStatus, RunReport};
use promptinfra::{pipeline, tracking};

/// PromptInfra — natural language to tagged Terraform.
#[derive(Parser)]
#[command(
    name = "promptinfra",
    about = "PromptInfra — turn a natural-language request into a tagged Terraform file",
    version,
    long_about = "PromptInfra generates Terraform from a plain-English request using a \
    chat-completion service, or a built-in template when none is configured. Every resource \
    is tagged, results are cached per request, and the file can be pushed to a Terraform \
    Cloud workspace."
)]
struct Cli {
    /// Path to a configuration file (TOML).
    ///
    /// Defaults to `./promptinfra.toml` when it exists; built-in defaults
    /// are used otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Terraform for a request.
    ///
    /// Writes the result to `main.tf` (see `[paths].output`), caches it by
    /// request fingerprint, and uploads it to the configured workspace when
    /// `TF_API_TOKEN` is set.
    Generate {
        /// The infrastructure request. Multiple words are joined by spaces.
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },

    /// Show tracked deployments and their estimated monthly cost.
    Costs,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("PROMPTINFRA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate { request } => {
            let request = request.join(" ");
            let settings = Settings::from_env(cfg);
            let report = pipeline::run(&settings, &request)?;
            print_summary(&report);
        }
        Commands::Costs => {
            tracking::run_costs(&cfg)?;
        }
    }

    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("PromptInfra — Terraform Generated");
    println!("=================================");
    println!("  Request:     {}", report.request);
    println!("  Fingerprint: {}", report.fingerprint);
    match report.template {
        Some(name) => println!("  Source:      {} ({} template)", report.source, name),
        None => println!("  Source:      {}", report.source),
    }
    println!("  Saved to:    {}", report.output_path.display());

    match &report.publish {
        PublishStatus::Published {
            configuration_version_id,
            workspace_url,
        } => {
            println!("  Workspace:   pushed ({})", configuration_version_id);
            println!();
            println!("Next: review and apply in Terraform Cloud");
            if let Some(url) = workspace_url {
                println!("  {}", url);
            }
        }
        PublishStatus::Skipped(reason) => {
            println!("  Workspace:   local only ({})", reason);
            print_local_steps();
        }
        PublishStatus::Failed(error) => {
            println!("  Workspace:   push failed ({})", error);
            print_local_steps();
        }
    }
}

fn print_local_steps() {
    println!();
    println!("Next: apply locally");
    println!("  terraform init");
    println!("  terraform plan");
    println!("  terraform apply");
}
