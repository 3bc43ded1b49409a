//! Postedit: incremental, idempotent rebuilds for generated static sites.
//!
//! After a site has been generated once, small edits ("make it blue", "move
//! the nav to the top right") should not regenerate everything. Postedit
//! turns the edit request into a canonical change set, applies it to the
//! persisted site document, re-renders only the affected files and writes
//! a side-by-side diff of the old and new build.
//!
//! # Architecture
//!
//! - **Site state**: one JSON document per site, stored in SQLite
//! - **Planner**: free-text prompt + scope list → canonical [`site::changeset::ChangeSet`]
//! - **Appliers**: one per scope, run in a fixed order (`css`, `nav`, `content`, `seo`, `head`)
//! - **Builder**: dirty pages are rendered, clean pages are copied from the previous build
//! - **Ledger**: every applied change set hash is recorded; replaying it is a no-op
//!
//! All database access routes through `DbBroker`, which serializes writers
//! and appends to `broker.events.jsonl` in the sandbox.
//!
//! # Examples
//!
//! ```bash
//! # Add pages to the stored site
//! postedit state seed --page / --page /services
//!
//! # Apply a scoped edit
//! postedit apply --scope css --prompt "Make it blue and rounded"
//!
//! # Review what has been applied
//! postedit history
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: storage, configuration, sandbox layout and diagnostics
//! - [`site`]: the site document model, planning, building and previewing
//! - [`plugins`]: per-scope change appliers and the model client seam

pub mod core;
pub mod plugins;
pub mod site;

use crate::core::{broker, config, error, time::command_envelope};
use site::pipeline::{OutcomeStatus, PipelineOutcome, PostEditPipeline};
use site::state_store::DEFAULT_STATE_KEY;

use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
#[clap(
    name = "postedit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Apply small edits to a generated site without rebuilding it"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ApplyCli {
    /// Scopes to edit (css, seo, images, logo, content, nav, head). Repeatable.
    #[clap(long = "scope", required = true)]
    scope: Vec<String>,
    /// Free-text edit request.
    #[clap(long)]
    prompt: Option<String>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct HistoryCli {
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct StateCli {
    #[clap(subcommand)]
    command: StateCommand,
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Print the stored site document as JSON
    Show,
    /// Add pages to the stored site document
    Seed {
        /// Page path such as `/services`. Repeatable.
        #[clap(long = "page", required = true)]
        pages: Vec<String>,
    },
    /// Row counts for every ledger table
    Summary,
}

#[derive(clap::Args, Debug)]
struct AuditCli {
    /// Number of most recent broker events to print.
    #[clap(long, default_value = "20")]
    limit: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan, apply, build and preview one edit
    #[clap(name = "apply", visible_alias = "a")]
    Apply(ApplyCli),

    /// List applied edits, newest first
    #[clap(name = "history")]
    History(HistoryCli),

    /// Print the path of the most recent preview
    #[clap(name = "preview", visible_alias = "p")]
    Preview,

    /// Inspect or seed the stored site document
    #[clap(name = "state", visible_alias = "s")]
    State(StateCli),

    /// Show the database broker audit trail
    #[clap(name = "audit")]
    Audit(AuditCli),

    /// Print the version
    #[clap(name = "version")]
    Version,
}

fn print_json(value: &serde_json::Value) -> Result<(), error::PostEditError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &PipelineOutcome) {
    use colored::Colorize;

    let hash_short: String = outcome.change_set_hash.chars().take(12).collect();
    match outcome.status {
        OutcomeStatus::Applied => println!(
            "{} change set {} ({} operations)",
            "applied".bright_green().bold(),
            hash_short.bright_white(),
            outcome.change_set.len()
        ),
        OutcomeStatus::Duplicate => println!(
            "{} change set {} was already applied",
            "skipped".yellow().bold(),
            hash_short.bright_white()
        ),
        OutcomeStatus::NoChanges => {
            println!("{} nothing to change", "skipped".yellow().bold())
        }
    }

    if let Some(build) = &outcome.build {
        println!("  build:   {}", build.output_dir.cyan());
        for file in &build.changed_files {
            println!("    {} {}", "~".bright_yellow(), file);
        }
        if !build.unchanged_files.is_empty() {
            println!(
                "    {} {} files reused",
                "=".dimmed(),
                build.unchanged_files.len()
            );
        }
    }
    if let Some(preview) = &outcome.preview {
        println!("  preview: {}", preview.path.cyan());
    }
}

pub fn run() -> Result<(), error::PostEditError> {
    let cli = Cli::parse();

    let open_pipeline = || -> Result<PostEditPipeline, error::PostEditError> {
        let current_dir = std::env::current_dir()?;
        PostEditPipeline::open(config::load_config(&current_dir)?)
    };

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
        }
        Command::Apply(apply) => {
            let pipeline = open_pipeline()?;
            let outcome = pipeline.run(apply.scope.as_slice(), apply.prompt.as_deref())?;
            if apply.format == "json" {
                let status = match outcome.status {
                    OutcomeStatus::Applied => "ok",
                    OutcomeStatus::Duplicate | OutcomeStatus::NoChanges => "skipped",
                };
                print_json(&command_envelope(
                    "apply",
                    status,
                    json!({ "outcome": serde_json::to_value(&outcome)? }),
                ))?;
            } else {
                print_outcome(&outcome);
            }
        }
        Command::History(history) => {
            let pipeline = open_pipeline()?;
            let edits = pipeline.store().list_edits()?;
            if history.format == "json" {
                print_json(&command_envelope(
                    "history",
                    "ok",
                    json!({ "edits": serde_json::to_value(&edits)? }),
                ))?;
            } else {
                use colored::Colorize;
                if edits.is_empty() {
                    println!("no edits recorded");
                }
                for edit in &edits {
                    let hash_short: String = edit.change_set_hash.chars().take(12).collect();
                    println!(
                        "{} {} [{}] {}",
                        edit.created_at.dimmed(),
                        hash_short.bright_white(),
                        edit.scope.cyan(),
                        edit.prompt.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Command::Preview => match open_pipeline()?.store().latest_preview()? {
            Some(preview) => println!("{}", preview.index_path),
            None => {
                return Err(error::PostEditError::NotFound(
                    "no preview has been generated yet".to_string(),
                ));
            }
        },
        Command::State(state_cli) => {
            let pipeline = open_pipeline()?;
            match state_cli.command {
                StateCommand::Show => {
                    let state = pipeline.store().load_site_state(DEFAULT_STATE_KEY)?;
                    println!("{}", serde_json::to_string_pretty(&state)?);
                }
                StateCommand::Seed { pages } => {
                    let state = pipeline.seed_pages(&pages)?;
                    println!("seeded {} pages", state.pages.len());
                }
                StateCommand::Summary => {
                    print_json(&pipeline.store().summary()?)?;
                }
            }
        }
        Command::Audit(audit) => {
            let pipeline = open_pipeline()?;
            let events = broker::read_audit(&pipeline.sandbox().root, audit.limit)?;
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    Ok(())
}
