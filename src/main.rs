use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::collect::{FeedError, NewsFeed};
use newsdesk::compose::{ComposeError, TextComposer};
use newsdesk::config::{Config, ConfigError, resolve_env_secret};
use newsdesk::http::composer::LlmComposer;
use newsdesk::http::feed::HttpNewsFeed;
use newsdesk::http::media::ImageSearchMediaSource;
use newsdesk::http::publisher::{DryRunPublisher, StatusApiPublisher};
use newsdesk::persistence::store::{SnapshotStore, StoreError};
use newsdesk::publish::{MediaError, MediaSource, PublishError, SocialPublisher};
use newsdesk::scheduler::run_scheduler;
use newsdesk::server::{AppState, build_router};
use newsdesk::state::queue::{next_queued, ordered_queue};
use newsdesk::tick::{Pipeline, TickError};

#[derive(Parser)]
#[command(name = "newsdesk", version, about = "News curation and publishing bot")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "NEWSDESK_CONFIG", default_value = "newsdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon: tick loops plus the observability server.
    Run,

    /// Run one collect pass and one publish pass, then exit.
    Tick,

    /// Run one collect pass, then exit.
    Collect,

    /// Run one publish pass, then exit.
    Post,

    /// Print the queue in publish order.
    Queue,

    /// Print the posted history.
    History,

    /// Validate the config file and print a redacted summary.
    CheckConfig,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tick(#[from] TickError),

    #[error("feed setup failed: {0}")]
    Feed(#[from] FeedError),

    #[error("composer setup failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("media setup failed: {0}")]
    Media(#[from] MediaError),

    #[error("publisher setup failed: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wires up the store and the four boundaries from config and environment.
fn build_pipeline(config: &Config) -> Result<Pipeline, AppError> {
    let store = SnapshotStore::new(&config.state_dir);

    let feed_key = resolve_env_secret(&config.feed.api_key_env)?;
    let feed: Arc<dyn NewsFeed> = Arc::new(HttpNewsFeed::new(config.feed.clone(), feed_key)?);

    let composer_key = resolve_env_secret(&config.composer.api_key_env)?;
    let composer: Arc<dyn TextComposer> =
        Arc::new(LlmComposer::new(config.composer.clone(), composer_key)?);

    let media: Option<Arc<dyn MediaSource>> = if config.media.enabled {
        let media_key = resolve_env_secret(&config.media.config.api_key_env)?;
        Some(Arc::new(ImageSearchMediaSource::new(
            config.media.config.clone(),
            media_key,
        )?))
    } else {
        None
    };

    let publisher: Arc<dyn SocialPublisher> = if config.dry_run {
        info!("dry-run mode: publishes will be logged, not sent");
        Arc::new(DryRunPublisher::new())
    } else {
        let token = resolve_env_secret(&config.publisher.token_env)?;
        Arc::new(StatusApiPublisher::new(config.publisher.clone(), token)?)
    };

    Ok(Pipeline::new(
        store,
        feed,
        composer,
        media,
        publisher,
        config.pipeline_config(),
    ))
}

async fn run_daemon(config: Config) -> Result<(), AppError> {
    let pipeline = Arc::new(build_pipeline(&config)?);
    let shutdown = CancellationToken::new();

    let addr = config.bind_addr()?;
    let app = build_router(AppState::new(&config.state_dir));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "observability server listening");

    let server_shutdown = shutdown.clone();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    };

    let scheduler = run_scheduler(Arc::clone(&pipeline), config.schedule.clone(), shutdown.clone());

    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        shutdown.cancel();
    };

    let (served, (), ()) = tokio::join!(server, scheduler, signal);
    served?;
    Ok(())
}

fn print_queue(config: &Config) -> Result<(), AppError> {
    let store = SnapshotStore::new(&config.state_dir);
    let snapshot = store.load_latest()?;
    let ordered = ordered_queue(&snapshot.queue);

    if ordered.is_empty() {
        println!("queue is empty (revision {})", snapshot.revision);
        return Ok(());
    }

    let now = Utc::now();
    let head = next_queued(&snapshot.queue).map(|i| i.id.clone());
    println!("{} queued items (revision {}):", ordered.len(), snapshot.revision);
    for item in ordered {
        let marker = if head.as_ref() == Some(&item.id) { "->" } else { "  " };
        let state = if item.is_expired(now) { " [expired]" } else { "" };
        println!(
            "{marker} score {:>5}  attempts {}  {}{state}",
            item.score, item.attempts, item.id
        );
    }
    Ok(())
}

fn print_history(config: &Config) -> Result<(), AppError> {
    let store = SnapshotStore::new(&config.state_dir);
    let snapshot = store.load_latest()?;

    if snapshot.posted_history.is_empty() {
        println!("no posts recorded (revision {})", snapshot.revision);
        return Ok(());
    }

    println!(
        "{} posted items (revision {}):",
        snapshot.posted_history.len(),
        snapshot.revision
    );
    for record in &snapshot.posted_history {
        println!(
            "{}  post {}  {}",
            record.posted_at.format("%Y-%m-%d %H:%M"),
            record.external_post_id,
            record.id
        );
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::CheckConfig => {
            let config = Config::load(&cli.config)?;
            print!("{}", config.summary());
            println!("config ok");
            Ok(())
        }
        Command::Queue => {
            let config = Config::load_or_default(&cli.config)?;
            print_queue(&config)
        }
        Command::History => {
            let config = Config::load_or_default(&cli.config)?;
            print_history(&config)
        }
        Command::Run => {
            let config = Config::load_or_default(&cli.config)?;
            run_daemon(config).await
        }
        Command::Tick => {
            let config = Config::load_or_default(&cli.config)?;
            let pipeline = build_pipeline(&config)?;
            let report = pipeline.full_tick(Utc::now()).await?;
            info!(?report, "tick complete");
            Ok(())
        }
        Command::Collect => {
            let config = Config::load_or_default(&cli.config)?;
            let pipeline = build_pipeline(&config)?;
            let report = pipeline.collect_tick(Utc::now()).await?;
            info!(?report, "collect complete");
            Ok(())
        }
        Command::Post => {
            let config = Config::load_or_default(&cli.config)?;
            let pipeline = build_pipeline(&config)?;
            let report = pipeline.post_tick(Utc::now()).await?;
            info!(?report, "post complete");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}
