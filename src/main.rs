use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use vpn_bypass::config::Config;
use vpn_bypass::feed::FeedClient;
use vpn_bypass::lock::{self, LockGuard};
use vpn_bypass::platform::system_executor;
use vpn_bypass::reconciler::{Reconciler, Scope};
use vpn_bypass::resolver::SystemResolver;
use vpn_bypass::store::RouteStore;

#[derive(Parser)]
#[command(name = "vpn-bypass")]
#[command(about = "Manage IP routes that bypass the VPN tunnel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all bypass routes (bulk and custom) to the routing table
    Up,
    /// Remove all bypass routes from the routing table
    Down,
    /// Regenerate the bulk collection from the allocation feed
    ///
    /// Tears down currently applied routes first; run `up` afterwards to
    /// apply the new set.
    Gen,
    /// Add a custom bypass route (domain or IPv4) and apply it
    Add { source: String },
    /// Remove a custom bypass route and retire it from the table
    Del { source: String },
    /// Generate default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging to stderr, keeping stdout for results
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init => {
            let path = PathBuf::from("vpn-bypass.toml");
            Config::default().save(&path)?;
            println!("Created default config: vpn-bypass.toml");
        }
        Commands::Up => {
            let (_config, reconciler, _lock) = open_engine(cli.config.as_deref())?;
            let count = reconciler.up(Scope::All)?;
            println!("Applied {} bypass routes", count);
        }
        Commands::Down => {
            let (_config, reconciler, _lock) = open_engine(cli.config.as_deref())?;
            let count = reconciler.down(Scope::All)?;
            println!("Removed {} bypass routes", count);
        }
        Commands::Gen => {
            let (config, reconciler, _lock) = open_engine(cli.config.as_deref())?;
            info!("Regenerating bulk collection, this can take a few minutes");
            let feed = FeedClient::new(&config.feed.url)?;
            let count = reconciler.regenerate(&feed).await?;
            println!("Regenerated bulk collection: {} routes", count);
            println!("Run `vpn-bypass up` to apply them");
        }
        Commands::Add { source } => {
            let (_config, reconciler, _lock) = open_engine(cli.config.as_deref())?;
            if reconciler.add_custom(&source)? {
                println!("Added custom route: {}", source.trim());
            } else {
                println!("Not added: {} (already present or invalid)", source.trim());
            }
        }
        Commands::Del { source } => {
            let (_config, reconciler, _lock) = open_engine(cli.config.as_deref())?;
            if reconciler.remove_custom(&source)? {
                println!("Removed custom route: {}", source.trim());
            } else {
                println!("No such custom route: {}", source.trim());
            }
        }
    }

    Ok(())
}

/// Load config and wire up the reconciler for a route-mutating
/// operation. The returned lock guard serializes invocations and must
/// stay alive for the duration of the operation.
fn open_engine(
    explicit_config: Option<&std::path::Path>,
) -> Result<(Config, Reconciler<SystemResolver>, LockGuard), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(explicit_config)?;
    let lock = LockGuard::acquire(&config.routes.data_dir.join(lock::LOCK_FILE))?;
    let store = RouteStore::open(&config.routes.data_dir, SystemResolver);
    let reconciler = Reconciler::new(store, system_executor()?, config.routes.metric);
    Ok((config, reconciler, lock))
}
