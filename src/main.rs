use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use futures::future::select_all;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use wikiedit_monitor::bus::{EventBus, InMemoryBus};
use wikiedit_monitor::capture::capture_stream;
use wikiedit_monitor::config::Config;
use wikiedit_monitor::dedup::DedupStore;
use wikiedit_monitor::error::MonitorError;
use wikiedit_monitor::diffs::{DiffQueue, HttpDiffFetcher};
use wikiedit_monitor::listeners::{ChangeListener, IrcListener, SseListener};
use wikiedit_monitor::monitor::{handle_fetch_response, Archiver, FileArchiver, Monitor};
use wikiedit_monitor::pipeline::{self, normalizer::normalize_event};
use wikiedit_monitor::recentchanges::Source;
use wikiedit_monitor::{logging, metrics};

#[derive(Parser)]
#[command(name = "wikiedit-monitor")]
#[command(about = "Wikipedia recent-change monitor and diff archiver")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (default: wikiedit-monitor.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: listen, normalize, deduplicate, fetch and archive diffs
    Run {
        /// Sources to listen to (comma-separated). Available: sse, irc
        #[arg(long, default_value = "sse,irc")]
        sources: String,
    },
    /// Connect one listener and print normalized events as JSON lines
    Listen {
        #[arg(long, default_value = "sse")]
        source: Source,
    },
    /// Save raw stream payloads as test fixtures
    Capture {
        /// Number of payloads to gather
        #[arg(long)]
        max: usize,
        #[arg(long, default_value = "testdata")]
        folder: PathBuf,
    },
    /// Fetch, validate and archive the diff of a single revision
    FetchDiff {
        #[arg(long)]
        revision: i64,
    },
}

fn parse_sources(list: &str) -> anyhow::Result<Vec<Source>> {
    let mut sources = Vec::new();
    for name in list.split(',').filter(|s| !s.trim().is_empty()) {
        let source: Source = name.parse().map_err(|e: String| anyhow!(e))?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        return Err(anyhow!("no sources selected"));
    }
    Ok(sources)
}

fn create_listener(source: Source, config: &Config) -> anyhow::Result<Arc<dyn ChangeListener>> {
    let listener: Arc<dyn ChangeListener> = match source {
        Source::Sse => Arc::new(SseListener::new(config.stream.url.clone())?),
        Source::Irc => Arc::new(IrcListener::new(config.irc.clone())),
    };
    Ok(listener)
}

async fn run(config: Config, sources: Vec<Source>) -> anyhow::Result<()> {
    metrics::init_metrics(&config.metrics.addr);

    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());

    let store = DedupStore::new(config.dedup.window());
    let sweeper = store.spawn_sweeper(config.dedup.sweep_interval());

    let fetcher = HttpDiffFetcher::new(&config.diffs.compare_url, config.diffs.timeout())?;
    let queue = Arc::new(DiffQueue::new(Arc::new(fetcher), config.diffs.queue_capacity));
    let archiver: Arc<dyn Archiver> = Arc::new(FileArchiver::new(&config.archive.folder));

    // Downstream subscriptions first so the first forwarded event is seen
    let mut stages = Monitor::new(queue, archiver).spawn(bus.clone()).await?;
    stages.extend(pipeline::spawn_stages(bus.clone(), store).await?);

    let mut forwarders = JoinSet::new();
    for source in sources {
        let listener = create_listener(source, &config)?;
        let options = config.listen.clone();
        let bus = bus.clone();
        forwarders.spawn(async move { (source, pipeline::forward(listener, options, bus).await) });
    }
    info!(wikis = ?config.listen.wikis, hidebots = config.listen.hidebots, "Pipeline started");

    let outcome = supervise(&mut forwarders, &mut stages, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for interrupt");
            std::future::pending::<()>().await;
        }
    })
    .await;

    forwarders.abort_all();
    for stage in &stages {
        stage.abort();
    }
    sweeper.abort();
    outcome
}

/// Watch the running pipeline until `shutdown` resolves.
///
/// A listener that stops is logged and the rest keep running; only a failure
/// to reach its upstream at startup is fatal. Running out of listeners ends the
/// run, and so does any stage task exiting.
async fn supervise(
    forwarders: &mut JoinSet<(Source, wikiedit_monitor::Result<()>)>,
    stages: &mut [JoinHandle<()>],
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupt received, shutting down");
                return Ok(());
            }
            Some(joined) = forwarders.join_next() => {
                match joined {
                    Ok((source, Ok(()))) => warn!(source = %source, "Listener stopped"),
                    Ok((source, Err(e @ MonitorError::Connect { .. }))) => {
                        return Err(anyhow!(e).context(format!("{} listener failed", source)));
                    }
                    Ok((source, Err(e))) => error!(source = %source, error = %e, "Listener failed"),
                    Err(e) => error!(error = %e, "Listener task panicked"),
                }
                if forwarders.is_empty() {
                    warn!("All listeners stopped, shutting down");
                    return Ok(());
                }
            }
            (joined, index, _) = select_all(stages.iter_mut()) => {
                if let Err(e) = joined {
                    error!(error = %e, "Stage task panicked");
                }
                return Err(anyhow!("pipeline stage {} exited", index));
            }
        }
    }
}

async fn listen(config: Config, source: Source) -> anyhow::Result<()> {
    let listener = create_listener(source, &config)?;
    let (tx, mut rx) = mpsc::channel(256);
    let options = config.listen.clone();
    let task = tokio::spawn(async move { listener.listen(&options, tx).await });

    while let Some(event) = rx.recv().await {
        if let Some(normalized) = normalize_event(&event) {
            println!("{}", serde_json::to_string(&normalized)?);
        }
    }

    task.await
        .context("listener task panicked")?
        .with_context(|| format!("{} listener failed", source))
}

async fn capture(config: Config, max: usize, folder: PathBuf) -> anyhow::Result<()> {
    info!(max, folder = %folder.display(), "Starting capture");
    let listener = SseListener::new(config.stream.url.clone())?;
    // capture everything the stream carries, bots included
    let mut conn = listener.connect(false).await?;

    tokio::select! {
        gathered = capture_stream(&mut conn, &folder, max) => {
            let gathered = gathered?;
            println!("Captured {} payloads into {}", gathered, folder.display());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping capture");
        }
    }
    Ok(())
}

async fn fetch_diff(config: Config, revision: i64) -> anyhow::Result<()> {
    let fetcher = HttpDiffFetcher::new(&config.diffs.compare_url, config.diffs.timeout())?;
    let queue = DiffQueue::new(Arc::new(fetcher), config.diffs.queue_capacity);
    let archiver = FileArchiver::new(&config.archive.folder);
    let path = archiver.path_for(revision);

    queue
        .enqueue(revision, move |result| {
            handle_fetch_response(&archiver, revision, result)
        })
        .await?;
    queue.drain().await;

    if path.exists() {
        println!("Archived revision {} to {}", revision, path.display());
        Ok(())
    } else {
        Err(anyhow!("revision {} was not archived", revision))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    logging::init_logging(std::path::Path::new(&config.logging.dir));

    let result = match cli.command {
        Commands::Run { sources } => {
            let sources = parse_sources(&sources)?;
            run(config, sources).await
        }
        Commands::Listen { source } => listen(config, source).await,
        Commands::Capture { max, folder } => capture(config, max, folder).await,
        Commands::FetchDiff { revision } => fetch_diff(config, revision).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
