//! pathfetch CLI
//!
//! Runs the HTTP service, or works against the configured store directly.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pathfetch::{
    error::{AppError, Result},
    models::Config,
    server::{self, AppState},
    services::Fetcher,
    storage,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// pathfetch - store URL lists under paths and fetch them on demand
#[derive(Parser, Debug)]
#[command(name = "pathfetch", version, about = "Path to URL aggregation service")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "pathfetch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Override the bind address from the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate URLs and store the valid ones under a path
    Store {
        path: String,
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print the URL records stored under a path
    Lookup { path: String },

    /// Fetch every URL stored under a path and print the results
    Fetch { path: String },

    /// Check URLs against the validator without storing them
    CheckUrl {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Validate the configuration and build a fetcher from it.
fn build_fetcher(config: &Config) -> Result<Fetcher> {
    config.validate()?;
    Fetcher::new(config.fetch.clone())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Validate => {
            log::info!("Validating {}...", cli.config.display());
            let config = Config::load(&cli.config)?;
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
        }

        Command::Serve { bind } => {
            let fetcher = build_fetcher(&config)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let store = storage::open(&config.store).await?;
            log::info!("pathfetch starting with {} store", store.backend());
            let state = AppState::new(store, fetcher).with_rate_limit(&config.server);
            server::serve(&config.server, state).await?;
        }

        Command::Store { path, urls } => {
            let fetcher = build_fetcher(&config)?;
            let store = storage::open(&config.store).await?;
            if store.backend() == "memory" {
                log::warn!("Memory store selected; data is discarded when this command exits");
            }

            let mut valid = Vec::new();
            let mut invalid = Vec::new();
            for url in urls {
                match fetcher.validator().validate(&url) {
                    Ok(_) => valid.push(url),
                    Err(e) => {
                        log::warn!("Rejected {}: {}", url, e);
                        invalid.push(format!("{url}: {e}"));
                    }
                }
            }
            if valid.is_empty() {
                return Err(AppError::config("no valid URLs to store"));
            }

            store.store(&path, &valid).await?;
            print_json(&json!({ "path": path, "count": valid.len(), "invalid_urls": invalid }))?;
        }

        Command::Lookup { path } => {
            config.validate()?;
            let store = storage::open(&config.store).await?;
            let records = store.lookup(&path).await?;
            print_json(&records)?;
        }

        Command::Fetch { path } => {
            let fetcher = build_fetcher(&config)?;
            let store = storage::open(&config.store).await?;
            let records = store.lookup(&path).await?;
            if records.is_empty() {
                log::warn!("No URLs stored under '{}'", path);
            }

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Ctrl-C received, cancelling fetches");
                    on_ctrl_c.cancel();
                }
            });

            let results = fetcher.fetch_all(&records, &cancel).await;
            print_json(&json!({ "path": path, "results": results }))?;
        }

        Command::CheckUrl { urls } => {
            let fetcher = build_fetcher(&config)?;
            let mut rejected = 0;
            for url in &urls {
                match fetcher.validator().validate(url) {
                    Ok(parsed) => println!("ok       {parsed}"),
                    Err(e) => {
                        rejected += 1;
                        println!("rejected {url}: {e}");
                    }
                }
            }
            if rejected > 0 {
                return Err(AppError::config(format!(
                    "{rejected} of {} URLs rejected",
                    urls.len()
                )));
            }
        }
    }

    Ok(())
}
