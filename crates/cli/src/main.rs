mod config_commands;
mod relay_commands;
mod run;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "crosstalk", about = "Crosstalk: cross-server message relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "CROSSTALK_CONFIG")]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9464).
    #[cfg(feature = "metrics")]
    #[arg(long, global = true, env = "CROSSTALK_METRICS_ADDR")]
    metrics_addr: Option<std::net::SocketAddr>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay, reading inbound messages as JSON lines on stdin.
    Run,
    /// Run all pending database migrations.
    Migrate,
    /// Show relay network statistics.
    Stats,
    /// Ban a user from the relay network.
    Ban {
        user_id: String,
        /// Id of the moderator issuing the ban.
        #[arg(long)]
        by: String,
        #[arg(long, default_value = "No reason provided")]
        reason: String,
    },
    /// Lift a ban.
    Unban { user_id: String },
    /// List banned users.
    Bans,
    /// Enable the relay in a server, posting into the given channel.
    Enable { guild_id: String, channel_id: String },
    /// Disable the relay in a server.
    Disable { guild_id: String },
    /// Probe every relay webhook and disable the dead ones.
    Sweep,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(cli: &Cli) -> anyhow::Result<crosstalk_metrics::MetricsHandle> {
    crosstalk_metrics::init_metrics(crosstalk_metrics::MetricsRecorderConfig {
        enabled: cli.metrics_addr.is_some(),
        listen: cli.metrics_addr,
        global_labels: vec![("service".into(), "crosstalk".into())],
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<crosstalk_config::CrosstalkConfig> {
    match cli.config {
        Some(ref path) => Ok(crosstalk_config::load_config(path)?),
        None => Ok(crosstalk_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    #[cfg(feature = "metrics")]
    let _metrics = init_metrics(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "crosstalk starting");

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run => run::run(config).await,
        Commands::Migrate => relay_commands::migrate(&config).await,
        Commands::Stats => relay_commands::stats(&config).await,
        Commands::Ban {
            user_id,
            by,
            reason,
        } => relay_commands::ban(&config, &user_id, &by, &reason).await,
        Commands::Unban { user_id } => relay_commands::unban(&config, &user_id).await,
        Commands::Bans => relay_commands::bans(&config).await,
        Commands::Enable {
            guild_id,
            channel_id,
        } => relay_commands::enable(&config, &guild_id, &channel_id).await,
        Commands::Disable { guild_id } => relay_commands::disable(&config, &guild_id).await,
        Commands::Sweep => relay_commands::sweep(&config).await,
        Commands::Config { action } => config_commands::handle_config(action, &config),
    }
}
