use {
    clap::{Parser, Subcommand},
    garupa_config::GarupaConfig,
    garupa_handoff::{HandoffStore, SqliteHandoffStore},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "garupa", about = "Instagram lead-capture bot for the showroom inbox")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides GARUPA_BIND).
    #[arg(long, global = true)]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server (default when no subcommand is provided).
    Serve,
    /// Release the interaction lock on a conversation so the bot resumes
    /// before the takeover TTL expires.
    Unblock {
        /// Instagram-scoped id of the conversation to unblock.
        conversation_id: String,
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

/// Drop the interaction lock for one conversation, reporting how much
/// suppression time was cancelled.
async fn unblock(conversation_id: &str) -> anyhow::Result<()> {
    let config = GarupaConfig::from_env()?;
    let options = SqliteConnectOptions::new()
        .filename(&config.storage.db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    SqliteHandoffStore::init(&pool).await?;
    let store = SqliteHandoffStore::new(pool, config.handoff_ttl());

    let remaining = store.remaining(conversation_id).await?;
    if store.release(conversation_id).await? {
        match remaining {
            Some(left) => println!(
                "Interaction lock released for {conversation_id} ({}s were left).",
                left.as_secs()
            ),
            None => println!("Interaction lock released for {conversation_id}."),
        }
    } else {
        println!("No active interaction lock for {conversation_id}.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "garupa starting");
            let mut config = GarupaConfig::from_env()?;
            if let Some(bind) = cli.bind {
                config.server.bind = bind;
            }
            garupa_gateway::run(config).await
        },
        Some(Commands::Unblock { conversation_id }) => unblock(&conversation_id).await,
    }
}
