use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cronbot_channel_telegram::{TelegramNotifier, api::TelegramApi, polling};
use cronbot_engine::{MessageFormat, Notifier, Scheduler};
use cronbot_store::CronDb;

#[derive(Parser)]
#[command(name = "cronbot", about = "Telegram-operated job scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot: operator command loop plus the task scheduler
    Run,
    /// Check the configuration and print a summary
    Health,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run())?;
        }
        Commands::Health => {
            let config = cronbot_config::load_config().context("failed to load config")?;
            println!("cronbot is healthy");
            println!("  chat id: {}", config.telegram.chat_id);
            println!("  timezone: {}", config.timezone.as_deref().unwrap_or("UTC"));
            println!("  tick interval: {}s", config.tick_secs);
            println!("  database: {}", cronbot_config::db_path()?.display());
        }
    }

    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = cronbot_config::load_config().context("failed to load config")?;
    cronbot_config::ensure_config_dir()?;

    let db_path = cronbot_config::db_path()?;
    let db = CronDb::open(&db_path).context("failed to open schedule database")?;

    let api = Arc::new(TelegramApi::new(&config.telegram.bot_token));
    let me = api
        .get_me()
        .await
        .context("failed to authenticate Telegram bot")?;
    info!(
        bot_username = me.username.as_deref().unwrap_or("unknown"),
        "Telegram bot authenticated"
    );

    let notifier = Arc::new(TelegramNotifier::new(api.clone(), config.telegram.chat_id));
    let scheduler = Arc::new(Scheduler::new(
        db,
        notifier.clone(),
        config.timezone.clone(),
    ));

    let cancel = CancellationToken::new();
    let scan = tokio::spawn(scheduler.clone().run(
        Duration::from_secs(config.tick_secs),
        cancel.child_token(),
    ));
    let commands = tokio::spawn(polling::run_command_loop(
        api,
        config.telegram.chat_id,
        scheduler,
        cancel.child_token(),
    ));

    if let Err(e) = notifier.notify("Bot started!", MessageFormat::Plain).await {
        warn!("Could not announce startup: {e}");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();
    let _ = tokio::join!(scan, commands);

    Ok(())
}
