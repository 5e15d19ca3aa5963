mod daemon;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "benchlink",
    about = "Benchlink — workshop companion bridging the web app to this machine"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Control-plane WebSocket URL (overrides config value).
    #[arg(long, global = true, env = "BENCHLINK_URL")]
    url: Option<String>,

    /// Directory of external plugin manifests (overrides default).
    #[arg(long, global = true, env = "BENCHLINK_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the companion daemon (default when no subcommand is given).
    Run,
    /// List plugin manifests and registered entry points.
    Plugins,
    /// Permission grant management.
    Grants {
        #[command(subcommand)]
        action: GrantAction,
    },
    /// Show the config path and effective settings.
    Config,
}

#[derive(Subcommand)]
enum GrantAction {
    /// List persisted grants.
    List,
    /// Revoke one persisted grant; the next request re-prompts.
    Revoke {
        plugin_id: String,
        capability: String,
    },
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        None | Some(Commands::Run) => daemon::run(cli.url, cli.plugin_dir).await,
        Some(Commands::Plugins) => list_plugins(cli.plugin_dir),
        Some(Commands::Grants { action }) => grants(action).await,
        Some(Commands::Config) => show_config(),
    }
}

fn list_plugins(plugin_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let mut manifests = benchlink_runtime::bundled::manifests();
    let dir = plugin_dir.unwrap_or_else(daemon::default_plugin_dir);
    manifests.extend(benchlink_runtime::PluginManifest::discover(&dir)?);

    for manifest in manifests {
        let enabled = if manifest.enabled { "" } else { " (disabled)" };
        println!(
            "{:<20} {:<10} {:<28} [{}]{}",
            manifest.id,
            manifest.version,
            manifest.entry_point,
            manifest.permissions.join(", "),
            enabled
        );
    }
    Ok(())
}

async fn grants(action: GrantAction) -> anyhow::Result<()> {
    let path = daemon::grants_path();
    let mut store = benchlink_permissions::GrantStore::load(path)?;

    match action {
        GrantAction::List => {
            for (key, granted) in store.entries() {
                println!("{key:<48} {}", if granted { "granted" } else { "denied" });
            }
        },
        GrantAction::Revoke {
            plugin_id,
            capability,
        } => {
            let capability: benchlink_common::Capability = capability
                .parse()
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            if store.remove(&plugin_id, capability)? {
                println!("revoked {plugin_id}:{capability}");
            } else {
                println!("no persisted decision for {plugin_id}:{capability}");
            }
        },
    }
    Ok(())
}

fn show_config() -> anyhow::Result<()> {
    let config = benchlink_config::discover_and_load();
    println!("config dir: {}", daemon::config_dir().display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
