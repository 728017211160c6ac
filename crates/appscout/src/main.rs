//! appscout: find the repository behind a frontend app.
//!
//! Subcommands:
//! - `resolve`: look up an app id, optionally narrowed by a browser pathname
//! - `list`: print every known app
//! - `refresh`: drop the cache and rescan the org
//! - `clear`: drop the cache

use std::path::PathBuf;
use std::sync::Arc;

use appscout_registry::{FileStore, ProgressCallback, RegistryCache, RegistryConfig, config};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "appscout")]
#[command(about = "Look up the repository behind a frontend app id or pathname", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// GitHub organization to scan
    #[arg(long, env = "APPSCOUT_ORG", default_value = config::DEFAULT_ORG, global = true)]
    org: String,

    /// Directory for the durable registry cache
    #[arg(long, env = "APPSCOUT_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// GitHub token, used only to raise API rate limits
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, default_value = config::DEFAULT_API_BASE_URL, global = true)]
    api_base_url: String,

    /// Raw file host base URL
    #[arg(long, default_value = config::DEFAULT_RAW_BASE_URL, global = true)]
    raw_base_url: String,

    /// Repositories scanned concurrently
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE, global = true)]
    batch_size: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an app id (and optional pathname) to its repository
    Resolve {
        /// App id reported by the frontend
        app_id: String,

        /// Browser pathname, e.g. /insights/advisor/recommendations
        #[arg(long)]
        pathname: Option<String>,
    },

    /// List every known app
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Drop both cache tiers and rescan
    Refresh,

    /// Drop both cache tiers
    Clear,
}

impl GlobalArgs {
    fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::default()
            .with_org(self.org.clone())
            .with_api_base_url(self.api_base_url.clone())
            .with_raw_base_url(self.raw_base_url.clone())
            .with_batch_size(self.batch_size)
            .with_token(self.token.clone())
    }

    fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(FileStore::default_dir)
    }

    fn open_cache(&self) -> Result<RegistryCache> {
        let store = Arc::new(FileStore::new(self.cache_dir()));
        debug!(dir = %store.dir().display(), org = %self.org, "opening registry cache");
        RegistryCache::new(self.registry_config(), store).into_diagnostic()
    }
}

fn stderr_progress() -> ProgressCallback {
    Arc::new(|status: &str| eprintln!("{status}"))
}

/// Run a command. Returns whether it found what it was asked for.
async fn run(cli: Cli) -> Result<bool> {
    let cache = cli.global.open_cache()?;
    cache.set_progress_callback(Some(stderr_progress())).await;

    match cli.command {
        Commands::Resolve { app_id, pathname } => {
            match cache
                .resolve(&app_id, pathname.as_deref())
                .await
                .into_diagnostic()?
            {
                Some(entry) => {
                    println!("{}\t{}", entry.app_id, entry.github_repo);
                    Ok(true)
                }
                None => {
                    eprintln!("No known repository for {app_id}");
                    Ok(false)
                }
            }
        }

        Commands::List { json } => {
            let entries = cache.fetch_registry().await.into_diagnostic()?;
            if json {
                let out = serde_json::to_string_pretty(&entries).into_diagnostic()?;
                println!("{out}");
            } else {
                let width = entries.iter().map(|e| e.app_id.len()).max().unwrap_or(0);
                for entry in &entries {
                    println!("{:width$}  {}", entry.app_id, entry.github_repo);
                }
            }
            Ok(true)
        }

        Commands::Refresh => {
            cache.refresh().await.into_diagnostic()?;
            let count = cache.fetch_registry().await.into_diagnostic()?.len();
            println!("Registry refreshed: {count} apps");
            Ok(true)
        }

        Commands::Clear => {
            cache.clear().await;
            println!("Registry cache cleared");
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "appscout=info,appscout_registry=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if !run(cli).await? {
        std::process::exit(1);
    }
    Ok(())
}
