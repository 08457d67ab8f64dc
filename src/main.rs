use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use p4tag::commands::changes::ChangesQuery;
use p4tag::config::Config;
use p4tag::connection::Connection;
use p4tag::error::P4Error;
use p4tag::parsers::ztag;

#[derive(Parser, Debug)]
#[command(name = "p4tag", about = "Query Perforce through p4 and print JSON")]
struct Cli {
    /// Path to a TOML config file (overrides P4TAG_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Server counters as a name → value map.
    Counters,
    /// Changes pending review since a counter.
    Reviews {
        #[arg(short = 't', long)]
        counter: String,
    },
    /// Changelists from the tagged listing.
    Changes {
        #[arg(short = 'm', long)]
        max: Option<u32>,
        #[arg(short = 's', long)]
        status: Option<String>,
        /// Full descriptions.
        #[arg(short = 'l', long)]
        long: bool,
        path: Option<String>,
    },
    /// Changelists scraped from the plain-text listing.
    Summaries {
        #[arg(short = 'm', long, default_value_t = 10)]
        max: u32,
    },
    Users,
    /// Run any command in tagged mode and print its records.
    Tagged {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Parse tagged output from stdin.
    Parse,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config;

    let connect = || -> anyhow::Result<Connection> {
        let config = match &config_path {
            Some(path) => Config::load_from(Some(path)),
            None => Config::load(),
        }
        .context("failed to load configuration")?;
        tracing::debug!(?config, "configuration loaded");

        // Ctrl-C kills the running p4 process group instead of orphaning it.
        let token = CancellationToken::new();
        let on_signal = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        Ok(Connection::new(config).with_cancellation(token))
    };

    let value = match cli.command {
        Cmd::Parse => {
            let records = ztag::parse_async(BufReader::new(tokio::io::stdin()))
                .await
                .context("failed to parse tagged input")?;
            serde_json::to_value(records)?
        }
        Cmd::Counters => serde_json::to_value(connect()?.counters().await.map_err(report)?)?,
        Cmd::Reviews { counter } => serde_json::to_value(
            connect()?
                .reviews_by_counter(&counter)
                .await
                .map_err(report)?,
        )?,
        Cmd::Changes {
            max,
            status,
            long,
            path,
        } => {
            let query = ChangesQuery {
                max,
                status,
                long_description: long,
                path,
            };
            serde_json::to_value(connect()?.changes(&query).await.map_err(report)?)?
        }
        Cmd::Summaries { max } => {
            serde_json::to_value(connect()?.change_summaries(max).await.map_err(report)?)?
        }
        Cmd::Users => serde_json::to_value(connect()?.users().await.map_err(report)?)?,
        Cmd::Tagged { args } => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            serde_json::to_value(connect()?.run_tagged(&args).await.map_err(report)?)?
        }
    };

    print_json(&value)
}

/// Log the full error, surface the short form.
fn report(e: P4Error) -> anyhow::Error {
    tracing::error!("{e}");
    anyhow::anyhow!(e.user_message())
}
