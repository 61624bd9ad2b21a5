//! # PromptInfra
//!
//! Turn a natural-language infrastructure request into a tagged Terraform
//! file, and optionally push it to a Terraform Cloud workspace.
//!
//! ## Architecture
//!
//! ```text
//! request ──▶ ┌───────────┐ miss ┌─────────────────────┐
//!             │   cache   │─────▶│ completion service  │──fail──┐
//!             └─────┬─────┘      └──────────┬──────────┘        ▼
//!                   │ hit                   │              ┌──────────┐
//!                   │                       │              │ template │
//!                   ▼                       ▼              └────┬─────┘
//!             ┌──────────────────────────────────────────────────┘
//!             │ tag normalizer ──▶ cache + main.tf ──▶ workspace (optional)
//!             └──────────────────────────────────────────────────
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...        # optional: remote generation
//! export TF_API_TOKEN=...          # optional: workspace publishing
//! export TF_ORGANIZATION=acme
//! export TF_WORKSPACE=sandbox
//!
//! promptinfra generate "Create a VPC with a public subnet"
//! promptinfra costs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML settings and environment credentials |
//! | [`cache`] | Request fingerprints and the on-disk artifact cache |
//! | [`templates`] | Keyword-selected fallback templates |
//! | [`generator`] | Chat-completion client |
//! | [`hcl`] | Lexical HCL scanner |
//! | [`tags`] | Tag injection and output normalization |
//! | [`publish`] | Terraform Cloud configuration-version upload |
//! | [`tracking`] | Per-run records and the cost report |
//! | [`pipeline`] | Orchestration of a single run |

pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod hcl;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod tags;
pub mod templates;
pub mod tracking;
