use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use import_gateway::config::Config;
use import_gateway::server::{self, AppState};

#[derive(Parser)]
#[command(name = "import-gateway")]
#[command(about = "Import job orchestration and OAuth datasource gateway")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "IMPORT_GATEWAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long, env = "IMPORT_GATEWAY_LISTEN", global = true)]
    listen: Option<String>,

    /// PostgreSQL URL, overrides the config file
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Session JWT secret, overrides the config file
    #[arg(long, env = "JWT_SECRET", global = true, hide_env_values = true)]
    jwt_secret: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Republish jobs left pending after a failed publish
    RequeuePending {
        /// Only jobs pending for at least this many seconds
        #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(i64).range(0..))]
        older_than_secs: i64,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(secret) = &self.jwt_secret {
            config.jwt_secret = secret.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            config.validate()?;
            let state = AppState::from_config(&config).await?;
            server::serve(state, &config.listen_addr).await?;
        }
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("migrate needs a database URL")?;
            let db = import_gateway::state::Database::connect(url).await?;
            db.migrate().await?;
            tracing::info!("Migrations applied");
        }
        Commands::RequeuePending { older_than_secs } => {
            if config.database_url.is_none() {
                anyhow::bail!("requeue-pending needs a database URL");
            }
            let older_than = chrono::Duration::try_seconds(older_than_secs)
                .context("--older-than-secs is out of range")?;
            let state = AppState::from_config(&config).await?;
            let queued = state.gateway.requeue_pending(older_than).await?;
            println!("requeued {queued} pending import jobs");
        }
    }

    Ok(())
}
