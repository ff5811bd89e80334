//! Command-line front end for the dependency-update search pipeline.
//!
//! Runs one ingestion session over the requested scopes and prints the
//! grouped, filtered view with aggregate statistics. Ctrl-C cancels the
//! in-flight run cooperatively; whatever was already fetched is still
//! reported.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use config::load::load_config;
use config::shared::{IngestConfig, SourceConfig};
use github::auth::EnvToken;
use github::client::GithubClient;
use ingest::filter::{RecordFilter, StateFilter};
use ingest::grouping::{GroupingStrategy, group_records};
use ingest::ordering::{GroupOrderState, order_fingerprint};
use ingest::session::IngestionSession;
use ingest::stats::collect_stats;

mod core;

use crate::core::{AppConfig, render_groups, render_outcomes};

/// Finds and groups automated dependency-update pull requests.
#[derive(Debug, Parser)]
#[command(name = "dash", version, about)]
struct Args {
    /// Search scopes, e.g. `org:acme author:app/renovate` or `repo:acme/api`.
    #[arg(required = true)]
    scopes: Vec<String>,

    /// Grouping strategy: dependency, repository, or author.
    #[arg(long, default_value = "dependency")]
    group_by: GroupingStrategy,

    /// Restrict to one lifecycle state: all, open, merged, or closed.
    #[arg(long, default_value = "all")]
    state: String,

    /// Substring filter on the repository full name.
    #[arg(long)]
    repository: Option<String>,

    /// Substring filter on the author login.
    #[arg(long)]
    author: Option<String>,

    /// Emit machine-readable JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::tracing::init_tracing("dash=info,ingest=info,github=info");

    let args = Args::parse();

    let app_config: AppConfig = load_config().context("loading configuration")?;
    app_config.validate().context("validating configuration")?;

    run(args, app_config.ingest, app_config.source).await
}

async fn run(args: Args, ingest: IngestConfig, source: SourceConfig) -> anyhow::Result<()> {
    let resolver = EnvToken::new(source.token_env.clone());
    let client = GithubClient::new(source, resolver).context("building API client")?;

    let mut session = IngestionSession::new(ingest, client, args.scopes.clone());

    session.start().await.context("starting ingestion")?;

    let settled = tokio::select! {
        report = session.wait() => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };

    let Some(report) = settled else {
        info!("interrupted, cancelling in-flight scopes");
        session.shutdown().await;

        // Whatever arrived before the cancellation is still presentable.
        let records = session.store().snapshot().await;
        return print_view(&args, &records);
    };

    let report = report.context("waiting for ingestion")?;
    render_outcomes(&report.outcomes);

    let records = session.store().snapshot().await;
    print_view(&args, &records)
}

fn print_view(args: &Args, records: &[ingest::types::PullRequest]) -> anyhow::Result<()> {
    let filter = RecordFilter {
        repository: args.repository.clone(),
        state: parse_state(&args.state)?,
        author: args.author.clone(),
        owner: None,
    };

    let filtered = ingest::filter::filter_records(records, &filter);
    let stats = collect_stats(&filtered);
    let groups = group_records(&filtered, args.group_by);

    // A single run has one fingerprint, so reconciliation adopts the fresh
    // order; keeping the call here means interactive front ends reuse the
    // exact same path.
    let mut order = GroupOrderState::new();
    let fingerprint = order_fingerprint(&filter, args.group_by);
    let ordered = order.reconcile(&fingerprint, groups);

    if args.json {
        let payload = serde_json::json!({
            "stats": stats,
            "groups": ordered,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        render_groups(&ordered, &stats);
    }

    Ok(())
}

fn parse_state(raw: &str) -> anyhow::Result<StateFilter> {
    match raw.to_lowercase().as_str() {
        "all" => Ok(StateFilter::All),
        "open" => Ok(StateFilter::Open),
        "merged" => Ok(StateFilter::Merged),
        "closed" => Ok(StateFilter::Closed),
        other => anyhow::bail!("unknown state filter `{other}`"),
    }
}
