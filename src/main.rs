// Copyright (c) 2026 OneNose Project
// Licensed under the MIT License. See LICENSE file in the project root.

//! OneNose - Directional Electronic Nose
//!
//! Runs the sampling loop against real hardware or the built-in plume
//! simulator, with an optional fullscreen status window.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use onenose::core::{channel, led_test, scan_bus, watch_interrupt, Engine, LoopSummary, StopReason};
use onenose::{Config, NAME, VERSION};

/// OneNose - Directional Electronic Nose
#[derive(Parser, Debug)]
#[command(name = "onenose")]
#[command(author = "OneNose Project")]
#[command(version = VERSION)]
#[command(about = "Directional gas sensing with an SGP30 array and an LED ring")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Label for batch file names
    #[arg(short, long)]
    label: Option<String>,

    /// Classifier model artifact (JSON)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Demo mode with simulated sensors
    #[arg(long)]
    demo: bool,

    /// Run without the status window
    #[arg(long)]
    headless: bool,

    /// Start a new CSV file every N rows
    #[arg(long)]
    batch_size: Option<u64>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, conflicts_with = "debug")]
    trace: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices behind every multiplexer channel
    Scan,
    /// Cycle colour wipes on the LED ring until interrupted
    LedTest,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    apply_overrides(&mut config, &args);

    // Initialize logging; flags win over the configured level
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{}", NAME, VERSION);

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = match args.command {
        Some(Command::Scan) => runtime.block_on(run_scan(&config)),
        Some(Command::LedTest) => runtime.block_on(run_led_test(&config)),
        None => run(&runtime, config),
    };

    // Pending stdin reads must not hold the process open
    runtime.shutdown_timeout(Duration::from_millis(500));
    result
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(label) = &args.label {
        config.export.label = label.clone();
    }
    if let Some(model) = &args.model {
        config.classifier.model_path = Some(model.clone());
    }
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(size) = args.batch_size {
        config.export.batch_size = Some(size);
    }
    if let Some(dir) = &args.data_dir {
        config.export.data_dir = dir.clone();
    }
    if args.headless {
        config.gui.enabled = false;
    }
}

fn run(runtime: &tokio::runtime::Runtime, config: Config) -> Result<()> {
    let allow_poweroff = config.buttons.allow_poweroff;
    let gui = config.gui.enabled;
    let engine = Engine::new(config)?;
    let (trigger, signal) = channel();

    let summary = if gui {
        run_with_window(runtime, engine, trigger, signal)?
    } else {
        info!("Starting in headless mode...");
        runtime.block_on(engine.run(trigger, signal, None))?
    };

    info!("Completed {} cycles", summary.cycles);
    if summary.reason == Some(StopReason::PowerOffButton) && allow_poweroff {
        power_off();
    }
    Ok(())
}

#[cfg(feature = "gui")]
fn run_with_window(
    runtime: &tokio::runtime::Runtime,
    engine: Engine,
    trigger: onenose::core::ShutdownTrigger,
    signal: onenose::core::ShutdownSignal,
) -> Result<LoopSummary> {
    use onenose::streaming::StatusSink;

    let config = engine.config.clone();
    let (status, feed) = StatusSink::new();
    // Startup errors return here, before the window opens
    let session = runtime.block_on(engine.prepare(Some(status)))?;
    let handle = runtime.spawn(session.run(trigger.clone(), signal.clone()));

    info!("Starting status window...");
    if let Err(e) = onenose::ui::run_gui(&config, feed, signal, trigger.clone()) {
        error!("{}", e);
    }
    trigger.stop(StopReason::GuiClosed);

    Ok(runtime.block_on(handle)?)
}

#[cfg(not(feature = "gui"))]
fn run_with_window(
    runtime: &tokio::runtime::Runtime,
    engine: Engine,
    trigger: onenose::core::ShutdownTrigger,
    signal: onenose::core::ShutdownSignal,
) -> Result<LoopSummary> {
    warn!("Built without the `gui` feature; running headless");
    runtime.block_on(engine.run(trigger, signal, None))
}

async fn run_scan(config: &Config) -> Result<()> {
    for entry in scan_bus(config).await? {
        let found: Vec<String> = entry.addresses.iter().map(|a| format!("0x{:02X}", a)).collect();
        println!("mux 0x{:02X} channel {}: {}", entry.mux, entry.channel, found.join(" "));
    }
    Ok(())
}

async fn run_led_test(config: &Config) -> Result<()> {
    let (trigger, signal) = channel();
    let interrupt = watch_interrupt(trigger);
    info!("LED test running, press Ctrl+C to stop");
    let result = led_test(config, signal).await;
    interrupt.abort();
    result
}

fn power_off() {
    info!("Power-off requested, shutting down in 2 seconds");
    std::thread::sleep(Duration::from_secs(2));
    match std::process::Command::new("sudo").args(["shutdown", "now"]).status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("shutdown exited with {}", status),
        Err(e) => error!("Failed to run shutdown: {}", e),
    }
}
