use anyhow::{Context, Result};
use clap::Parser;
use serenity::all::GatewayIntents;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkin_bot::app::App;
use checkin_bot::commands::{self, Data, Error};
use checkin_bot::config::BotConfig;
use checkin_bot::roster::Roster;
use checkin_bot::scheduler::PollingScheduler;
use checkin_bot::state::StateStore;

#[derive(Parser)]
#[command(name = "checkin-bot")]
#[command(about = "Announces calendar events on Discord and checks students in by reaction")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "checkin-bot.toml", env = "CHECKIN_BOT_CONFIG")]
    config: PathBuf,

    /// Print an example configuration and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_bot=debug,serenity=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.print_example_config {
        println!("{}", toml::to_string_pretty(&BotConfig::example())?);
        return Ok(());
    }

    tracing::info!("Starting check-in bot");

    let config = BotConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let token = config.token()?;
    let prefix = config.bot.prefix.clone();

    let roster = Roster::load(&config.files.students_file);
    let state = StateStore::load(&config.files.data_file);
    let app = Arc::new(App::new(config, roster, state)?);
    app.load_caches().await;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Logged in as {} ({})", ready.user.name, ready.user.id);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                PollingScheduler::new(ctx.clone(), app.clone()).start();
                Ok(Data { app })
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::Client::builder(token, intents)
        .framework(framework)
        .await
        .context("Failed to build Discord client")?;

    // Wait for shutdown signal
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping...");
            shard_manager.shutdown_all().await;
        }
    });

    tracing::info!("Bot running. Press Ctrl+C to stop.");
    client.start().await.context("Discord client error")?;

    tracing::info!("Bot stopped");
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            tracing::error!("Failed to start the bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("Command '{}' failed: {:?}", ctx.command().name, error);
            if let Err(e) = ctx.say(format!(":x: {}", error)).await {
                tracing::error!("Could not report command error: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}
