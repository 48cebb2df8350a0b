use anisync::{
    build_watch_url, AnimeApi, Config, ConnectivityMonitor, DetailSyncEngine, JikanClient,
    ListItem, ListSyncEngine, LocalStore, RefreshResult, SyncConfig, TcpProbeObserver,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "anisync")]
#[command(about = "Anime catalog cache with offline-first sync", long_about = None)]
struct Args {
    /// Config file (defaults to ./anisync.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the remote API
    #[arg(long)]
    api_url: Option<String>,

    /// SQLite cache file
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh and print the ranked list
    List {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Refresh and print one anime
    Detail {
        id: i64,
    },
    /// Keep the list in sync, re-fetching whenever the API becomes reachable
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anisync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(path) = args.db_path {
        config.db_path = Some(path);
    }

    let db_path = config.resolve_db_path();
    let store = Arc::new(LocalStore::open(&db_path)?);
    tracing::debug!("Cache opened at {}", db_path.display());

    let api: Arc<dyn AnimeApi> = Arc::new(JikanClient::from_config(&config)?);
    let sync_config = SyncConfig::from(&config);

    match args.command {
        Command::List { page } => {
            let engine = ListSyncEngine::new(api, store.clone(), None, sync_config);
            let mut events = engine.events();
            engine.refresh(page).await;
            if let Ok(event) = events.try_recv() {
                tracing::info!("{}", event);
            }
            print_list(&store.list_items().await?);
        }
        Command::Detail { id } => {
            let engine = DetailSyncEngine::new(api, store, None, sync_config);
            let mut events = engine.events();
            engine.refresh(id).await;
            if let Ok(event) = events.try_recv() {
                tracing::info!("{}", event);
            }
            match engine.get_once(id).await {
                Some(record) => {
                    println!("{} (#{})", record.title, record.id);
                    println!("  score:    {}", format_score(record.score));
                    println!("  episodes: {}", format_episodes(record.episodes));
                    if let Some(genres) = &record.genres {
                        println!("  genres:   {}", genres);
                    }
                    if let Some(cast) = &record.cast {
                        println!("  cast:     {}", cast);
                    }
                    if let Some(video_id) = &record.video_id {
                        println!("  trailer:  {}", build_watch_url(video_id));
                    }
                    if let Some(synopsis) = &record.synopsis {
                        println!();
                        println!("{}", synopsis);
                    }
                }
                None => println!("Anime {} is not cached", id),
            }
        }
        Command::Watch => watch(api, store, &config, sync_config).await?,
    }

    Ok(())
}

async fn watch(
    api: Arc<dyn AnimeApi>,
    store: Arc<LocalStore>,
    config: &Config,
    sync_config: SyncConfig,
) -> anyhow::Result<()> {
    let observer = TcpProbeObserver::from_url(&config.api_url, config.probe_interval())?;
    let monitor = ConnectivityMonitor::new(Arc::new(observer));
    let engine = ListSyncEngine::new(api, store, Some(monitor), sync_config);

    let mut events = engine.events();
    let session = engine.start().await;
    tracing::info!("Watching {} (Ctrl+C to stop)", config.api_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", event);
                    if event.outcome == RefreshResult::Updated {
                        print_list(&engine_snapshot(&engine).await);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} sync events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.close();
    tracing::info!("Stopped");
    Ok(())
}

async fn engine_snapshot(engine: &ListSyncEngine) -> Vec<ListItem> {
    use futures::StreamExt;

    let stream = engine.observe();
    tokio::pin!(stream);
    stream.next().await.unwrap_or_default()
}

fn print_list(items: &[ListItem]) {
    if items.is_empty() {
        println!("No cached anime");
        return;
    }
    for (rank, item) in items.iter().enumerate() {
        println!(
            "{:>3}. {:<50} {:>5}  {:>4} eps",
            rank + 1,
            item.title,
            format_score(item.score),
            format_episodes(item.episodes)
        );
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".to_string())
}

fn format_episodes(episodes: Option<u32>) -> String {
    episodes.map(|e| e.to_string()).unwrap_or_else(|| "?".to_string())
}
