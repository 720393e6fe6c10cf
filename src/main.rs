//! Binary entrypoint for pan-zoom-frame.
//!
//! Wires the library together: catalog, producer thread, presenter loop and
//! the control channel.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use crossbeam_channel::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pan_zoom_frame::config::Configuration;
use pan_zoom_frame::events::{Command, ViewerCommand};
use pan_zoom_frame::gpu::MemoryDevice;
use pan_zoom_frame::gpu::wgpu_device::WgpuTileDevice;
use pan_zoom_frame::processing::contrib::ContributionCache;
use pan_zoom_frame::slot::SlotPair;
use pan_zoom_frame::tasks::catalog::{Catalog, PhotoCatalog};
use pan_zoom_frame::tasks::loader::FileLoader;
use pan_zoom_frame::tasks::presenter::{self, Presenter, PresenterSettings};
use pan_zoom_frame::tasks::producer::{Producer, ProducerSettings};

#[derive(Debug, Parser)]
#[command(
    name = "pan-zoom-frame",
    version,
    about = "Tiled pan/zoom crossfading slideshow"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Deterministic RNG seed for catalog shuffling and pan/zoom paths
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Override the global speed multiplier
    #[arg(long, value_name = "FACTOR")]
    speed: Option<f64>,
    /// Stop after this many slides have been shown
    #[arg(long = "max-slides", value_name = "COUNT")]
    max_slides: Option<usize>,
    /// Keep textures in host memory instead of opening a graphics device
    #[arg(long = "no-gpu")]
    no_gpu: bool,
    /// Write each produced slide's composed tiles as PNG into DIR
    #[arg(long = "dump-tiles", value_name = "DIR")]
    dump_tiles: Option<PathBuf>,
    /// Print the next N catalog entries without starting the slideshow
    #[arg(long = "catalog-dry-run", value_name = "ITERATIONS")]
    catalog_dry_run: Option<usize>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "pan_zoom_frame=debug,info",
        _ => "pan_zoom_frame=trace,info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        cfg.startup_shuffle_seed = Some(seed);
    }
    if let Some(speed) = args.speed {
        cfg.timing.speed = speed;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", args.config.display(), cfg);

    let catalog = open_catalog(&cfg)?;
    if let Some(iterations) = args.catalog_dry_run {
        run_catalog_dry_run(catalog, iterations);
        return Ok(());
    }

    if let Some(dir) = &args.dump_tiles {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let geometry = cfg.geometry.tile_geometry()?;
    let slots = Arc::new(SlotPair::new(geometry));
    let catalog = Arc::new(Mutex::new(catalog));
    let cancel = CancellationToken::new();

    let (command_tx, command_rx) = crossbeam_channel::bounded::<Command>(16);
    spawn_control_reader(command_tx, cancel.clone());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let producer = Producer::new(
        Arc::clone(&slots),
        Arc::clone(&catalog),
        FileLoader::new(
            geometry.texture_width() as u32,
            geometry.texture_height() as u32,
        ),
        Arc::new(ContributionCache::new()),
        geometry,
        ProducerSettings {
            retry_delay: cfg.producer.retry_delay,
            idle_delay: cfg.producer.idle_delay,
            dump_tiles: args.dump_tiles.clone(),
        },
        cancel.clone(),
    );
    let producer_thread = thread::Builder::new()
        .name("producer".into())
        .spawn({
            let cancel = cancel.clone();
            move || {
                let result = producer.run();
                if result.is_err() {
                    cancel.cancel();
                }
                result
            }
        })
        .context("failed to spawn producer thread")?;

    let settings = PresenterSettings {
        timing: cfg.timing.timing(),
        speed: cfg.timing.speed,
        upload_retry_limit: cfg.presenter.upload_retry_limit,
        idle_delay: cfg.presenter.idle_delay,
        frame_interval: cfg.presenter.frame_interval,
        seed: cfg.startup_shuffle_seed,
    };

    let presented = if args.no_gpu {
        let presenter = Presenter::new(Arc::clone(&slots), MemoryDevice::new(), geometry, &settings)?;
        presenter::run(presenter, command_rx, catalog, settings, args.max_slides, cancel.clone())
            .await
    } else {
        let device = WgpuTileDevice::new().context("failed to open graphics device")?;
        let presenter = Presenter::new(Arc::clone(&slots), device, geometry, &settings)?;
        presenter::run(presenter, command_rx, catalog, settings, args.max_slides, cancel.clone())
            .await
    };
    cancel.cancel();

    let produced = producer_thread
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?;
    presented.context("presenter failed")?;
    produced.context("producer failed")?;
    info!("shutdown complete");
    Ok(())
}

fn open_catalog(cfg: &Configuration) -> Result<PhotoCatalog> {
    let catalog = match (&cfg.photo_library_path, &cfg.slideshow_file) {
        (Some(dir), _) => PhotoCatalog::from_directory(dir, cfg.startup_shuffle_seed)
            .with_context(|| format!("failed to scan {}", dir.display()))?,
        (None, Some(file)) => PhotoCatalog::from_slideshow_file(file)
            .with_context(|| format!("failed to read slideshow file {}", file.display()))?,
        (None, None) => return Err(anyhow!("no catalog source configured")),
    };
    info!(entries = catalog.len(), "catalog ready");
    Ok(catalog)
}

fn run_catalog_dry_run(mut catalog: PhotoCatalog, iterations: usize) {
    for i in 0..iterations {
        let Some(entry) = catalog.next_entry() else {
            break;
        };
        let seconds = entry
            .duration
            .map(|d| format!(" ({}s)", d.as_secs()))
            .unwrap_or_default();
        println!(
            "{:>4}: {}{} [{}]",
            i + 1,
            entry.path.display(),
            seconds,
            entry.display_name
        );
    }
}

/// Reads control commands from stdin, one per line. End of input shuts the
/// slideshow down.
fn spawn_control_reader(commands: Sender<Command>, cancel: CancellationToken) {
    if !io::stdin().is_terminal() {
        tracing::debug!("stdin is not a terminal; skipping control reader");
        return;
    }
    let spawned = thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stdin reader failed: {err}");
                        break;
                    }
                };
                match Command::parse(&line) {
                    Some(command) => {
                        if commands.send(command).is_err() {
                            return;
                        }
                        if command == Command::Viewer(ViewerCommand::Quit) {
                            return;
                        }
                    }
                    None => warn!(input = %line.trim(), "unknown command"),
                }
            }
            info!("stdin closed; initiating shutdown");
            cancel.cancel();
        });
    if let Err(err) = spawned {
        warn!("failed to spawn control reader: {err}");
    }
}
