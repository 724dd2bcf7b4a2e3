//! CLI entry point for fleet-api: a Fleet REST API client.
//!
//! Connects with an API token or email/password, then runs one command:
//! list hosts, show a host, or run a live query against hosts and labels.
//! Results are printed to stdout as pretty JSON; logs go to stderr and are
//! controlled with `RUST_LOG` (default `warn`).
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (connection, API error, bad profile, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fleet_api::campaign::PollConfig;
use fleet_api::config::FleetConfig;
use fleet_api::hosts::{ListHostsParams, get_host, list_hosts};
use fleet_api::live_query::{QuerySource, QueryTargets, RunOptions, run_query};
use fleet_api::session::Session;
use fleet_api::{FleetError, Result};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML profile with `url` and credentials. Flags and environment
    /// variables override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fleet server address, e.g. https://fleet.example.com.
    #[arg(long, env = "FLEET_URL")]
    url: Option<String>,

    /// API token. Prefer the FLEET_API_TOKEN environment variable to keep
    /// it out of process listings and shell history.
    #[arg(long, env = "FLEET_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Login email, used with --password when no API token is given.
    #[arg(long, env = "FLEET_EMAIL")]
    email: Option<String>,

    #[arg(long, env = "FLEET_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List hosts.
    Hosts {
        /// Match hostname, UUID, serial, or IP.
        #[arg(long)]
        search: Option<String>,
        /// online, offline, new, missing, or mia.
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        team_id: Option<u64>,
        #[arg(long)]
        label_id: Option<u64>,
    },
    /// Show one host by numeric id.
    Host { id: u64 },
    /// Run a live query against hosts and/or labels.
    Query(QueryArgs),
}

#[derive(clap::Args)]
struct QueryArgs {
    #[command(flatten)]
    source: SourceFlags,

    /// Target host id; repeat for several hosts.
    #[arg(long = "host")]
    hosts: Vec<u64>,

    /// Target label id; repeat for several labels. Forces campaign mode.
    #[arg(long = "label")]
    labels: Vec<u64>,

    /// Start a campaign and print it without waiting for results.
    #[arg(long)]
    no_wait: bool,

    /// Maximum seconds to wait for a campaign before returning partial results.
    #[arg(long, default_value_t = 60)]
    max_wait: u64,
}

/// Exactly one query source per invocation.
#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct SourceFlags {
    /// Raw SQL to run.
    #[arg(long)]
    sql: Option<String>,

    /// Id of a saved query to run.
    #[arg(long)]
    query_id: Option<u64>,
}

impl QueryArgs {
    fn source(&self) -> Result<QuerySource> {
        match (&self.source.sql, self.source.query_id) {
            (Some(sql), None) => Ok(QuerySource::Sql(sql.clone())),
            (None, Some(id)) => Ok(QuerySource::Saved(id)),
            _ => Err(FleetError::InvalidRequest(
                "exactly one of --sql or --query-id is required".to_string(),
            )),
        }
    }

    fn targets(&self) -> QueryTargets {
        QueryTargets {
            hosts: self.hosts.clone(),
            labels: self.labels.clone(),
        }
    }

    fn options(&self) -> RunOptions {
        if self.no_wait {
            return RunOptions {
                synchronous: false,
                poll: None,
            };
        }
        RunOptions {
            synchronous: true,
            poll: Some(PollConfig {
                timeout: Duration::from_secs(self.max_wait),
                ..PollConfig::default()
            }),
        }
    }
}

/// Profile first, then flag/env overrides.
fn resolve_config(cli: &Cli) -> Result<FleetConfig> {
    let mut config = match (&cli.config, &cli.url) {
        (Some(path), _) => FleetConfig::load(path)?,
        (None, Some(url)) => FleetConfig::new(url.clone()),
        (None, None) => {
            return Err(FleetError::Config(
                "no server configured: pass --url, set FLEET_URL, or use --config".to_string(),
            ));
        }
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(token) = &cli.api_token {
        config.api_token = Some(token.clone());
    }
    if let Some(email) = &cli.email {
        config.email = Some(email.clone());
    }
    if let Some(password) = &cli.password {
        config.password = Some(password.clone());
    }
    Ok(config)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn run(cli: Cli) -> Result<String> {
    let config = resolve_config(&cli)?;

    // Fail on missing credentials or a bad query source before any I/O.
    config.credentials()?;
    if let Commands::Query(args) = &cli.command {
        args.source()?;
    }

    let session = Session::new();
    let conn = session.connect(&config).await?;

    let output = match &cli.command {
        Commands::Hosts {
            search,
            status,
            team_id,
            label_id,
        } => {
            let params = ListHostsParams {
                search: search.clone(),
                status: status.clone(),
                team_id: *team_id,
                label_id: *label_id,
                ..Default::default()
            };
            list_hosts(&conn, &params).await.and_then(|hosts| to_json(&hosts))
        }
        Commands::Host { id } => get_host(&conn, *id).await.and_then(|host| to_json(&host)),
        Commands::Query(args) => {
            let source = args.source()?;
            run_query(&conn, &source, &args.targets(), &args.options())
                .await
                .and_then(|execution| to_json(&execution))
        }
    };

    session.disconnect().await;
    output
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
