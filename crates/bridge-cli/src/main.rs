use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::replay::{run_replay, ReplayArgs};

#[derive(Parser)]
#[command(name = "bridge")]
#[command(about = "Change-data-capture bridge operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands (uses BRIDGE_DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env overrides ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Replay a JSON-lines capture (one raw message per line) through the bridge
    Replay {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// JSON-lines file to replay
        #[arg(long)]
        file: String,

        /// Partition number reported in logs
        #[arg(long, default_value_t = 0)]
        partition: u32,

        /// Apply to an in-memory store instead of Postgres
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Seconds to wait for in-flight reconciliation after the file ends
        #[arg(long, default_value_t = 10)]
        drain_secs: u64,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    // logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = bridge_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = bridge_db::status(&pool).await?;
                    println!("db_ok={} has_documents_table={}", s.ok, s.has_documents_table);
                }
                DbCmd::Migrate => {
                    bridge_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Replay {
            config_paths,
            file,
            partition,
            dry_run,
            drain_secs,
        } => {
            let summary = run_replay(ReplayArgs {
                config_paths,
                file,
                partition,
                dry_run,
                drain: Duration::from_secs(drain_secs),
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
