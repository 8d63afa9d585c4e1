//! `rover-drive` – drive coordinator command line.
//!
//! This binary assembles the whole drive stack from one config file and
//! hands the terminal to an operator shell:
//!
//! 1. Loads `~/.rover-drive/config.toml` (or `$ROVER_DRIVE_CONFIG`), writing
//!    a default file on first run.  Duplicate source ids abort startup.
//! 2. Registers the command sources, builds the kinematic model and a
//!    simulated actuator set matching it.
//! 3. Starts the control loop, one ingress task per source and the bus
//!    control listener on a Tokio runtime.
//! 4. Runs the REPL (`/intent`, `/rearm`, `/estop`, `/status`, `/sources`).
//! 5. Intercepts **Ctrl-C** to emergency-stop the rover before exiting.

mod config;
mod repl;

use colored::Colorize;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use rover_hal::SimRegistry;
use rover_kernel::{CommandSourceRegistry, Limiter};
use rover_middleware::EventBus;
use rover_runtime::{DriveCoordinator, control_loop, init_tracing, spawn_control_listener, spawn_ingress};
use rover_types::DriveError;

/// Queue depth of each source's ingress channel.
const INGRESS_CAPACITY: usize = 32;

fn main() -> ExitCode {
    let _telemetry = init_tracing("rover-drive");

    print_banner();

    match start() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Startup failed".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn start() -> Result<(), DriveError> {
    // ── Configuration ─────────────────────────────────────────────────────
    let (cfg, created) = config::load_or_create()?;
    let path = config::config_path().display().to_string();
    if created {
        println!("  {} Default config written to {}", "✓".green().bold(), path.bold());
    } else {
        println!("  Config loaded from {}", path.bold());
    }
    cfg.validate()?;

    // ── Drive stack ───────────────────────────────────────────────────────
    let registry = Arc::new(CommandSourceRegistry::new());
    for source in &cfg.sources {
        registry.register(source.clone())?;
    }

    let model = cfg.geometry.build()?;
    println!(
        "  Kinematic model {} driving {}",
        model.name().bold(),
        model.actuator_ids().join(", ").dimmed()
    );
    let (actuators, _sim) = SimRegistry::builder()
        .with_actuators(model.actuator_ids().to_vec())
        .build();

    let bus = EventBus::default();
    let coordinator = DriveCoordinator::new(cfg.coordinator.clone(), Arc::clone(&registry), model, actuators)?
        .with_limiter(Limiter::new(cfg.limits.clone()))
        .with_bus(bus.clone());
    let handle = control_loop::handle(&coordinator);

    // ── Tokio tasks ───────────────────────────────────────────────────────
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| DriveError::Config(format!("failed to start tokio runtime: {e}")))?;
    let (done_tx, done_rx) = std::sync::mpsc::channel::<u64>();
    let mut senders = BTreeMap::new();
    let loop_task = {
        let _guard = runtime.enter();
        for source in &cfg.sources {
            let (tx, rx) = mpsc::channel(INGRESS_CAPACITY);
            spawn_ingress(Arc::clone(&registry), source.source_id.clone(), rx)?;
            senders.insert(source.source_id.clone(), tx);
        }
        spawn_control_listener(&bus, handle.clone());
        tokio::spawn(async move {
            let cycles = control_loop::run(coordinator).await;
            let _ = done_tx.send(cycles);
            cycles
        })
    };
    info!(
        sources = cfg.sources.len(),
        period_ms = cfg.coordinator.period_ms,
        "drive coordinator started"
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let ctrlc_handle = handle.clone();
    let grace = cfg.coordinator.period() * 4 + Duration::from_millis(100);

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        ctrlc_handle.emergency_stop("operator Ctrl-C");
        ctrlc_handle.shutdown();
        shutdown_clone.store(true, Ordering::SeqCst);

        match done_rx.recv_timeout(grace) {
            Ok(cycles) => println!("{} ({cycles} cycles)", "  ✓ Actuators zeroed.".green()),
            Err(_) => println!("{}", "  ✗ Control loop did not confirm the stop.".red()),
        }
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the rover");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let shell = repl::Shell {
        handle: handle.clone(),
        registry,
        senders,
    };
    repl::run(&shell, shutdown);

    handle.shutdown();
    match runtime.block_on(loop_task) {
        Ok(cycles) => info!(cycles, "drive coordinator stopped"),
        Err(e) => warn!(error = %e, "control loop task failed"),
    }
    println!("{}", "  ✓ Rover stopped.".green());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "rover-drive".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Drive coordinator for wheeled rovers");
    println!();
}
