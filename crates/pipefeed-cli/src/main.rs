//! Pipefeed CLI
//!
//! The `pipefeed` command shows a GitLab project's pipelines annotated with
//! why they ran, and performs the branch and merge actions that feed those
//! annotations.
//!
//! ## Commands
//!
//! - `jobs`: one page of the classified pipeline feed
//! - `pipeline`: a pipeline with its jobs
//! - `branches` / `branch create`: list or create branches
//! - `mr create|accept|auto`: merge request actions
//! - `promote`: move `<stage>/<name>` one step towards `main`
//!
//! Every command prints JSON on stdout. Hints recorded by an action only live
//! for this process, so pass `--feed` to see their effect on the feed.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use pipefeed_core::{
    AcceptOptions, BranchStage, EngineConfig, FeedEngine, NewMergeRequest, PipelineId,
    PromoteRequest,
};
use pipefeed_gitlab::{GitLabConfig, GitLabGateway};

#[derive(Parser, Debug)]
#[command(name = "pipefeed")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI pipeline feed with branch and merge task classification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// GitLab instance root URL
    #[arg(long, env = "GITLAB_BASE_URL", global = true, default_value = "")]
    base_url: String,

    /// GitLab access token
    #[arg(long, env = "GITLAB_TOKEN", global = true, hide_env_values = true, default_value = "")]
    token: String,

    /// Project id or `group/project` path
    #[arg(long, env = "GITLAB_PROJECT_ID", global = true, default_value = "")]
    project: String,

    /// Accept invalid TLS certificates
    #[arg(long, env = "GITLAB_INSECURE", global = true)]
    insecure: bool,

    /// After an action, also print the first page of the feed
    #[arg(long, global = true)]
    feed: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show one page of the classified pipeline feed
    Jobs {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },

    /// Show a pipeline and its jobs
    Pipeline { id: PipelineId },

    /// List branches
    Branches,

    /// Manage branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Merge request actions
    Mr {
        #[command(subcommand)]
        action: MrAction,
    },

    /// Promote feature/<name> -> test/<name> -> release/<name> -> main
    Promote {
        /// Source stage
        #[arg(long, value_parser = parse_stage)]
        prefix: BranchStage,

        /// Branch name without the stage prefix
        #[arg(long)]
        name: String,

        /// Target branch (`auto` for the next stage)
        #[arg(long)]
        target: Option<String>,

        /// Merge request title (default: "<source> -> <target>")
        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        accept: AcceptArgs,
    },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    /// Create a feature/, test/ or release/ branch from main
    Create { name: String },
}

#[derive(Subcommand, Debug)]
enum MrAction {
    /// Open a merge request (or reuse the open one)
    Create {
        #[command(flatten)]
        create: CreateArgs,

        #[command(flatten)]
        flags: MergeFlags,

        /// Ask the service to merge once the pipeline succeeds
        #[arg(long)]
        when_pipeline_succeeds: bool,
    },

    /// Accept a merge request once it can be merged
    Accept {
        iid: u64,

        #[command(flatten)]
        accept: AcceptArgs,
    },

    /// Open (or reuse) a merge request and accept it
    Auto {
        #[command(flatten)]
        create: CreateArgs,

        #[command(flatten)]
        accept: AcceptArgs,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long)]
    source: String,

    #[arg(long)]
    target: String,

    #[arg(long)]
    title: String,

    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct MergeFlags {
    /// Squash commits on merge
    #[arg(long)]
    squash: bool,

    /// Delete the source branch after merging
    #[arg(long)]
    remove_source: bool,
}

#[derive(Args, Debug)]
struct AcceptArgs {
    #[command(flatten)]
    flags: MergeFlags,

    /// Merge once the pipeline succeeds instead of now
    #[arg(long)]
    when_pipeline_succeeds: bool,

    /// Custom merge commit message
    #[arg(long)]
    message: Option<String>,
}

impl AcceptArgs {
    fn options(&self) -> AcceptOptions {
        AcceptOptions {
            squash: self.flags.squash,
            remove_source_branch: self.flags.remove_source,
            merge_when_pipeline_succeeds: self.when_pipeline_succeeds,
            merge_commit_message: self.message.clone(),
        }
    }
}

impl CreateArgs {
    fn request(&self, flags: &MergeFlags, when_pipeline_succeeds: bool) -> NewMergeRequest {
        NewMergeRequest {
            source_branch: self.source.clone(),
            target_branch: self.target.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            squash: flags.squash,
            remove_source_branch: flags.remove_source,
            merge_when_pipeline_succeeds: when_pipeline_succeeds,
        }
    }
}

fn parse_stage(s: &str) -> std::result::Result<BranchStage, String> {
    s.parse().map_err(|e: pipefeed_core::FeedError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pipefeed_core::init_tracing(cli.json, level);

    let gitlab = GitLabConfig::new(&cli.base_url, &cli.token, &cli.project)
        .with_insecure(cli.insecure);
    let gateway = GitLabGateway::new(&gitlab).context("Failed to configure GitLab gateway")?;
    let engine = FeedEngine::new(Arc::new(gateway), EngineConfig::from_env())
        .context("Invalid engine configuration")?;

    let outputs = run(&engine, cli.command, cli.feed).await;
    engine.metrics().flush();

    for output in outputs? {
        print_json(&output)?;
    }
    Ok(())
}

/// Execute `command` and collect what should be printed, in order.
async fn run(engine: &FeedEngine, command: Commands, feed: bool) -> Result<Vec<Value>> {
    let is_action = matches!(
        command,
        Commands::Branch { .. } | Commands::Mr { .. } | Commands::Promote { .. }
    );

    let mut outputs = vec![match command {
        Commands::Jobs { page, per_page } => to_value(
            &engine
                .list_enriched_page(page, per_page)
                .await
                .context("Failed to list pipelines")?,
        )?,
        Commands::Pipeline { id } => to_value(
            &engine
                .pipeline_detail(id)
                .await
                .with_context(|| format!("Failed to load pipeline {id}"))?,
        )?,
        Commands::Branches => to_value(
            &engine
                .list_branches()
                .await
                .context("Failed to list branches")?,
        )?,
        Commands::Branch {
            action: BranchAction::Create { name },
        } => {
            let branch = engine
                .create_branch(&name)
                .await
                .with_context(|| format!("Failed to create branch {name}"))?;
            info!(branch = %branch.name, "created");
            to_value(&branch)?
        }
        Commands::Mr { action } => match action {
            MrAction::Create {
                create,
                flags,
                when_pipeline_succeeds,
            } => to_value(
                &engine
                    .create_merge_request(&create.request(&flags, when_pipeline_succeeds))
                    .await
                    .context("Failed to create merge request")?,
            )?,
            MrAction::Accept { iid, accept } => to_value(
                &engine
                    .accept_merge_request(iid, &accept.options())
                    .await
                    .with_context(|| format!("Failed to accept merge request !{iid}"))?,
            )?,
            MrAction::Auto { create, accept } => to_value(
                &engine
                    .auto_merge(
                        &create.request(&accept.flags, accept.when_pipeline_succeeds),
                        &accept.options(),
                    )
                    .await
                    .context("Failed to auto-merge")?,
            )?,
        },
        Commands::Promote {
            prefix,
            name,
            target,
            title,
            accept,
        } => {
            let request = PromoteRequest {
                stage: prefix,
                name,
                target,
                title,
                description: None,
                accept: accept.options(),
                squash: accept.flags.squash,
                remove_source_branch: accept.flags.remove_source,
            };
            to_value(
                &engine
                    .promote(&request)
                    .await
                    .context("Failed to promote")?,
            )?
        }
    }];

    if feed && is_action {
        let page = engine
            .list_enriched_page(1, 0)
            .await
            .context("Failed to list pipelines")?;
        outputs.push(to_value(&page)?);
    }
    Ok(outputs)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}

fn print_json(value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{text}");
    Ok(())
}
