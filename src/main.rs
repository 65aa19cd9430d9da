use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use newsroll::enrich::NewsParser;
use newsroll::feed::load_sources;
use newsroll::{tls, Aggregator, Config, Quota, SnapshotStore};

/// Get the default config file path (~/.config/newsroll/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("newsroll")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "newsroll",
    about = "Fetch several RSS feeds at once and print the latest items as JSON"
)]
struct Args {
    /// Config file (defaults to ~/.config/newsroll/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read sources from an OPML file instead of the config
    #[arg(long, value_name = "FILE")]
    opml: Option<PathBuf>,

    /// Apply the same item limit to every source
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Per-source timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verify TLS certificates
    #[arg(long)]
    verify_ssl: bool,

    /// Accept invalid or self-signed TLS certificates
    #[arg(long, conflicts_with = "verify_ssl")]
    insecure: bool,

    /// Print an extraction prompt per item instead of JSON
    #[arg(long)]
    prompts: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

/// Applies command-line overrides on top of the loaded config.
fn apply_overrides(args: &Args, config: &mut Config) {
    if let Some(limit) = args.limit {
        config.limits = Quota::Uniform(limit);
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if args.verify_ssl {
        config.verify_ssl = true;
    }
    if args.insecure {
        config.verify_ssl = false;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    apply_overrides(&args, &mut config);

    tls::init_tls_policy(config.verify_ssl);

    let sources = match &args.opml {
        Some(path) => load_sources(path)
            .await
            .with_context(|| format!("Failed to import OPML file {}", path.display()))?,
        None => config.sources(),
    };
    if sources.is_empty() {
        anyhow::bail!("No usable feed sources configured");
    }

    let aggregator = Aggregator::new(sources, config.limits.clone(), config.aggregate_options())
        .context("Invalid aggregation settings")?;

    let store = SnapshotStore::new();
    let snapshot = store.refresh(&aggregator).await;

    if snapshot.news.len() < aggregator.sources().len() {
        tracing::warn!(
            succeeded = snapshot.news.len(),
            total = aggregator.sources().len(),
            "Some sources could not be fetched"
        );
    }
    tracing::info!(
        sources = snapshot.news.len(),
        insecure_tls = tls::insecure_tls_active(),
        fetched_at = %snapshot.fetched_at,
        "Run finished"
    );

    if args.prompts {
        let parser = NewsParser::new();
        for (source, items) in &snapshot.news {
            for item in items {
                let prompt = parser
                    .render_prompt(item)
                    .with_context(|| format!("Item from {} has no text", source))?;
                println!("# {}\n{}", source, prompt);
            }
        }
        return Ok(());
    }

    let json = if args.pretty {
        serde_json::to_string_pretty(&snapshot.news)
    } else {
        serde_json::to_string(&snapshot.news)
    }
    .context("Failed to serialize results")?;
    println!("{}", json);

    Ok(())
}
