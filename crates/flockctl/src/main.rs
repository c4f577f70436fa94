use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{FlockConfig, Segment};
use protocol_hls::{server::HlsServer, HlsView};
use segment_catalog::{CatalogReloader, DirectoryListing, SegmentCatalog, SegmentDirectory};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walker::{Driver, PlaybackWindow, WalkPolicy};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = std::env::var("FLOCK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter.clone())
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
    });
}

#[derive(Parser)]
#[command(name = "flockctl")]
#[command(about = "Endless segment stream control utility", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, Args)]
struct ServeArgs {
    /// YAML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding the segment files
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Number of segments kept in the playlist window
    #[arg(long)]
    window: Option<usize>,
    /// Chance of jumping to a random loop at each step
    #[arg(long)]
    jump_probability: Option<f64>,
    /// Chance of taking an available loop
    #[arg(long)]
    loop_probability: Option<f64>,
    /// Steps between two directory rescans
    #[arg(long)]
    reload_every: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the segment graph and serve it as an HLS stream
    Serve(ServeArgs),
    /// Parse a segment directory and report what was understood
    Scan {
        /// Segment directory
        dir: PathBuf,
        #[arg(short, long, default_value = "mp4")]
        extension: String,
    },
    /// Print the segment graph of a directory as Graphviz DOT
    Graph {
        /// Segment directory
        dir: PathBuf,
        #[arg(short, long, default_value = "mp4")]
        extension: String,
    },
}

fn load_config(args: &ServeArgs) -> Result<FlockConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            FlockConfig::from_yaml(&text)?
        }
        None => FlockConfig::default(),
    };

    if let Some(root) = &args.root {
        config.segment_root = root.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(window) = args.window {
        config.window_capacity = window;
    }
    if let Some(p) = args.jump_probability {
        config.jump_probability = p;
    }
    if let Some(p) = args.loop_probability {
        config.loop_probability = p;
    }
    if let Some(steps) = args.reload_every {
        config.reload_every = steps;
    }

    config.validate()?;
    Ok(config)
}

fn load_catalog(dir: &Path, extension: &str) -> Result<SegmentCatalog> {
    let listing = SegmentDirectory::new(dir, extension);
    let catalog = SegmentCatalog::new();
    let report = catalog.update(listing.list()?);
    if !report.is_clean() {
        warn!(rejected = report.rejected.len(), "some files were skipped");
    }
    Ok(catalog)
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;
    let policy = WalkPolicy::from_config(&config)?;
    let catalog = Arc::new(SegmentCatalog::new());
    let listing = Arc::new(SegmentDirectory::new(
        &config.segment_root,
        &config.extension,
    ));
    let reloader = Arc::new(CatalogReloader::new(Arc::clone(&catalog), listing));

    // An empty or missing directory is not fatal: the driver keeps retrying.
    match reloader.reload() {
        Ok(report) => info!(?report, "initial scan"),
        Err(err) => warn!(error = %err, "initial scan failed"),
    }

    let window = Arc::new(PlaybackWindow::new(config.window_capacity));
    let driver = Driver::new(reloader, Arc::clone(&window), policy).configured(&config);
    let view = HlsView::new(
        Arc::clone(&catalog),
        Arc::clone(&window),
        config.segment_url_prefix.as_str(),
    );
    let server = HlsServer::new(view, &config.segment_root, config.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let driver = driver.spawn();

        let outcome = tokio::select! {
            served = server.run() => served,
            signal = tokio::signal::ctrl_c() => {
                info!("shutting down");
                signal.map_err(anyhow::Error::from)
            }
        };
        driver.abort();
        outcome
    })
}

fn run_scan(dir: &Path, extension: &str) -> Result<()> {
    let listing = SegmentDirectory::new(dir, extension);
    let files = listing.list()?;
    if files.is_empty() {
        println!("(no segment files)");
        return Ok(());
    }

    println!("Gen\tId\tStart\tEnd\tSecs\tLoop\tFile");
    let mut rejected = Vec::new();
    for file in files {
        match Segment::from_path(&file) {
            Ok(segment) => println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                segment.generation(),
                segment.identity(),
                segment.start_node(),
                segment.end_node(),
                segment.duration().as_secs(),
                if segment.is_loop() { "yes" } else { "no" },
                segment.file_name().unwrap_or_default()
            ),
            Err(err) => rejected.push(err),
        }
    }
    for err in &rejected {
        println!("skipped: {}", err);
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            run_serve(args)?;
        }
        Commands::Scan { dir, extension } => {
            run_scan(&dir, &extension)?;
        }
        Commands::Graph { dir, extension } => {
            let catalog = load_catalog(&dir, &extension)?;
            print!("{}", catalog.graph().to_dot());
        }
    }

    Ok(())
}
