//! Grove CLI - The `grove` command.
//!
//! Runs one pillar (or a whole installation in one process) from an
//! installation file, checks such a file, or writes an example one.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use grove_core::backend::AudioBackend;
use grove_core::{
    ControlLoop, InstallationConfig, LogBackend, LogLightSink, LoopbackBus, PillarIo, Runtime,
    SimulatedSensors,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Grove - Interactive sound/light pillars
#[derive(Parser, Debug)]
#[command(name = "grove")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generative music engine for touch-sensitive sound/light pillars", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a pillar
    Run {
        /// Installation file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Pillar id (default: $HOSTNAME)
        #[arg(short, long)]
        pillar: Option<String>,

        /// Run every pillar in this process, relaying between them
        #[arg(long, conflicts_with = "pillar")]
        all: bool,

        /// Where notes go
        #[arg(long, value_enum, default_value_t = BackendKind::Log)]
        backend: BackendKind,

        /// SuperCollider server address for the osc backend
        #[arg(long, default_value = "127.0.0.1:57110")]
        osc_addr: String,

        /// Seed for simulated touches and colours
        #[arg(long)]
        seed: Option<u64>,

        /// Chance per tick that a simulated channel gets touched
        #[arg(long, default_value_t = 0.02)]
        touch_probability: f64,
    },

    /// Resolve every pillar in an installation file and report problems
    Check {
        /// Installation file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Write an example installation file
    Init {
        /// Where to write it
        #[arg(value_name = "PATH", default_value = "grove.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Log every call
    Log,
    /// SuperCollider over OSC
    Osc,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            config,
            pillar,
            all,
            backend,
            osc_addr,
            seed,
            touch_probability,
        } => run(RunOptions {
            config,
            pillar,
            all,
            backend,
            osc_addr,
            seed,
            touch_probability,
        }),
        Commands::Check { config } => check(&config),
        Commands::Init { path, force } => init(&path, force),
    }
}

struct RunOptions {
    config: PathBuf,
    pillar: Option<String>,
    all: bool,
    backend: BackendKind,
    osc_addr: String,
    seed: Option<u64>,
    touch_probability: f64,
}

fn load(path: &Path) -> Result<InstallationConfig> {
    InstallationConfig::load(path)
        .with_context(|| format!("Failed to load installation file: {}", path.display()))
}

fn make_backend(kind: BackendKind, osc_addr: &str) -> Result<Arc<dyn AudioBackend>> {
    Ok(match kind {
        BackendKind::Log => Arc::new(LogBackend::new()),
        BackendKind::Osc => Arc::new(
            grove_core::OscBackend::connect(osc_addr)
                .with_context(|| format!("Failed to reach SuperCollider at {}", osc_addr))?,
        ),
    })
}

fn run(options: RunOptions) -> Result<()> {
    let config = load(&options.config)?;

    let ids: Vec<String> = if options.all {
        config.pillar_ids().map(String::from).collect()
    } else {
        let id = match options.pillar {
            Some(id) => id,
            None => std::env::var("HOSTNAME")
                .context("No --pillar given and $HOSTNAME is not set")?,
        };
        vec![id]
    };
    if ids.is_empty() {
        anyhow::bail!("{} defines no pillars", options.config.display());
    }

    let bus = LoopbackBus::new();
    let mut runtimes = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        let settings = config
            .resolve(id)
            .with_context(|| format!("Invalid configuration for pillar '{}'", id))?;
        let seed = options.seed.map(|s| s.wrapping_add(i as u64));
        let io = PillarIo {
            backend: make_backend(options.backend, &options.osc_addr)?,
            sensors: Box::new(
                SimulatedSensors::new(settings.mapper.channels, seed)
                    .with_touch_probability(options.touch_probability),
            ),
            lights: Box::new(LogLightSink),
            relay: Some(Box::new(bus.attach(id.clone()))),
        };
        let control = ControlLoop::new(&settings, io, seed)
            .with_context(|| format!("Failed to set up pillar '{}'", id))?;
        runtimes.push(
            Runtime::start(control, settings.tick_interval)
                .with_context(|| format!("Failed to start pillar '{}'", id))?,
        );
    }

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, term.clone())
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term.clone())
        .context("Failed to install SIGTERM handler")?;

    log::info!("Running {} pillar(s) (Press Ctrl+C to exit)", runtimes.len());
    while !term.load(Ordering::Relaxed) {
        if runtimes.iter().any(Runtime::is_finished) {
            log::error!("A control thread exited unexpectedly");
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    for runtime in runtimes {
        runtime.shutdown();
    }
    Ok(())
}

fn check(path: &Path) -> Result<()> {
    let config = load(path)?;
    let mut failures = 0;
    for id in config.pillar_ids() {
        match config.resolve(id) {
            Ok(settings) => println!(
                "ok     {} ({}, {} channels, {:.0} bpm)",
                id,
                settings.mapping.policy_name(),
                settings.mapper.channels,
                settings.initial.bpm
            ),
            Err(e) => {
                failures += 1;
                println!("error  {}: {}", id, e);
            }
        }
    }
    if config.pillars.is_empty() {
        anyhow::bail!("{} defines no pillars", path.display());
    }
    if failures > 0 {
        anyhow::bail!("{} pillar(s) failed to resolve", failures);
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    InstallationConfig::example()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created example installation at: {}", path.display());
    Ok(())
}
