//! `cartograph`: CLI entry point wiring the watcher, Sync Coordinator,
//! Dynamic Ingestor, and Query Surface together into a runnable binary.
//!
//! Not part of the engine's tested invariants — this is the concrete shell
//! so the crate is runnable end to end.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use cartograph::{Config, DynamicIngestor, GraphStore, NodeKind, QuerySurface, StorageMode, SyncCoordinator};

#[derive(Parser)]
#[command(name = "cartograph", version, about = "Live, queryable dependency graph engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Perform an initial scan, then watch the directory for changes.
    Watch {
        dir: PathBuf,
        #[arg(long)]
        snapshot_path: Option<PathBuf>,
    },
    /// Perform a one-shot scan and print a summary.
    Scan { dir: PathBuf },
    /// Print node/edge counts for a directory, loading a snapshot if given.
    Status {
        dir: PathBuf,
        #[arg(long)]
        snapshot_path: Option<PathBuf>,
    },
    /// Run a read-only query against a scanned (or snapshotted) directory.
    Query {
        dir: PathBuf,
        #[arg(long)]
        snapshot_path: Option<PathBuf>,
        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Subcommand)]
enum QueryCommand {
    /// List nodes, optionally filtered by kind.
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Case-insensitive substring search over node id/filepath.
    Search {
        substring: String,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Direct callers of a function id.
    Callers {
        id: String,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Direct callees of a function id.
    Callees {
        id: String,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "fatal error");
        eprintln!("cartograph: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Watch { dir, snapshot_path } => cmd_watch(dir, snapshot_path),
        Command::Scan { dir } => cmd_scan(dir),
        Command::Status { dir, snapshot_path } => cmd_status(dir, snapshot_path),
        Command::Query { dir, snapshot_path, query } => cmd_query(dir, snapshot_path, query),
    }
}

fn build_config(dir: PathBuf, snapshot_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match snapshot_path {
        Some(path) => Config::new(dir).with_snapshot(path),
        None => Config::new(dir),
    };
    config.validate()?;
    Ok(config)
}

/// Walk `config.watch_dir` once, ingesting every file the Parser Facade
/// recognizes. Used both by `scan` and as the seed pass before `watch`
/// starts listening for further changes.
fn initial_scan(store: &GraphStore, config: &Config) {
    for entry in WalkDir::new(&config.watch_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !config.is_ingestible(path) {
            continue;
        }
        let Some(path_str) = path.to_str() else { continue };
        let Some(parser) = cartograph::parser::parser_for(path) else { continue };
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = path_str, error = %e, "failed to read file during initial scan");
                continue;
            }
        };
        let parse_result = parser.parse(path_str, &bytes);
        if let Err(e) = store.upsert_file(path_str, parse_result, None) {
            tracing::warn!(path = path_str, error = %e, "failed to ingest file during initial scan");
        }
    }
}

fn cmd_watch(dir: PathBuf, snapshot_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = build_config(dir, snapshot_path)?;
    let watch_dir = config.watch_dir.clone();

    let store = Arc::new(GraphStore::new(config.clone()));
    if config.storage_mode == StorageMode::Snapshot {
        store.load_snapshot()?;
    }
    initial_scan(&store, &config);

    let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&store), config.clone()));

    let (ingestor, _sender) =
        DynamicIngestor::new(Arc::clone(&store), Duration::from_secs_f64(config.dynamic_poll_interval_seconds));
    let dynamic_shutdown = ingestor.shutdown_handle();
    let dynamic_thread = std::thread::spawn(move || ingestor.run());

    let watcher_shutdown = Arc::new(AtomicBool::new(false));
    let watcher_shutdown_for_signal = Arc::clone(&watcher_shutdown);
    let dynamic_shutdown_for_signal = Arc::clone(&dynamic_shutdown);
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            watcher_shutdown_for_signal.store(true, std::sync::atomic::Ordering::SeqCst);
            dynamic_shutdown_for_signal.store(true, std::sync::atomic::Ordering::SeqCst);
        })?;
    }

    tracing::info!(dir = %watch_dir.display(), "watching for changes");
    cartograph::watcher::watch(&watch_dir, coordinator, watcher_shutdown)?;

    dynamic_shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    let _ = dynamic_thread.join();
    Ok(())
}

fn cmd_scan(dir: PathBuf) -> anyhow::Result<()> {
    let config = build_config(dir, None)?;
    let store = GraphStore::new(config.clone());
    initial_scan(&store, &config);
    println!("nodes: {}", store.get_all_nodes().len());
    println!("edges: {}", store.get_all_edges().len());
    Ok(())
}

fn cmd_status(dir: PathBuf, snapshot_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = build_config(dir, snapshot_path)?;
    let store = GraphStore::new(config.clone());
    if config.storage_mode == StorageMode::Snapshot {
        store.load_snapshot()?;
    } else {
        initial_scan(&store, &config);
    }
    println!("watch_dir: {}", config.watch_dir.display());
    println!("nodes: {}", store.get_all_nodes().len());
    println!("edges: {}", store.get_all_edges().len());
    Ok(())
}

fn cmd_query(dir: PathBuf, snapshot_path: Option<PathBuf>, query: QueryCommand) -> anyhow::Result<()> {
    let config = build_config(dir, snapshot_path)?;
    let store = Arc::new(GraphStore::new(config.clone()));
    if config.storage_mode == StorageMode::Snapshot {
        store.load_snapshot()?;
    } else {
        initial_scan(&store, &config);
    }
    let surface = QuerySurface::new(store);

    match query {
        QueryCommand::List { kind, limit } => {
            let kind_filter = kind.as_deref().and_then(parse_node_kind);
            for node in surface.list_nodes(kind_filter, limit) {
                println!("{}\t{}\t{}", node.id, node.kind, node.filepath);
            }
        }
        QueryCommand::Search { substring, limit } => {
            for node in surface.search_nodes(&substring, limit) {
                println!("{}\t{}", node.id, node.filepath);
            }
        }
        QueryCommand::Callers { id, limit } => {
            for node in surface.callers_of(&id, limit) {
                println!("{}", node.id);
            }
        }
        QueryCommand::Callees { id, limit } => {
            for node in surface.callees_of(&id, limit) {
                println!("{}", node.id);
            }
        }
    }
    Ok(())
}

fn parse_node_kind(s: &str) -> Option<NodeKind> {
    match s {
        "module" => Some(NodeKind::Module),
        "class" => Some(NodeKind::Class),
        "function" => Some(NodeKind::Function),
        "import" => Some(NodeKind::Import),
        "call" => Some(NodeKind::Call),
        "variable" => Some(NodeKind::Variable),
        _ => None,
    }
}
