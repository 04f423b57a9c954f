use anyhow::Result;
use clap::{Parser, Subcommand};
use hubkit::config::CliOverrides;
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "hubkit")]
#[command(version, about = "Service directory and API server for the hub apps")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to hub.toml (defaults to ./hub.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Use the in-memory backend with demo data
        #[arg(long)]
        memory: bool,

        /// Enable dev mode (CORS permissive for a local frontend dev server)
        #[arg(long)]
        dev: bool,
    },
    /// List the apps in the service registry
    Services {
        /// Only apps that are publicly launched
        #[arg(long)]
        ready: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    hubkit::telemetry::init(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Serve {
            port,
            host,
            memory,
            dev,
        } => {
            let overrides = CliOverrides {
                host: host.clone(),
                port: *port,
                memory: *memory,
                dev: *dev,
            };
            cmd::cmd_serve(cli.config.as_deref(), overrides).await?;
        }
        Commands::Services { ready, json } => cmd::cmd_services(*ready, *json)?,
        Commands::Config => cmd::cmd_config(cli.config.as_deref())?,
    }

    Ok(())
}
