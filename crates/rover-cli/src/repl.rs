//! REPL – the operator shell for a running drive coordinator.
//!
//! Supported slash-commands:
//!   /intent <source> <vx> <wz>  – inject one intent on behalf of a source
//!   /rearm                      – request a re-arm out of SAFE_STOP
//!   /estop [reason]             – emergency stop
//!   /status                     – latest diagnostic report
//!   /sources                    – registered sources and their freshness
//!   /help                       – show this list
//!   /quit | /exit               – stop the rover and exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use rover_kernel::{CommandSourceRegistry, watchdog};
use rover_runtime::CoordinatorHandle;
use rover_types::{Clock, CoordinatorState, Freshness, VelocityIntent};

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent {
        source_id: String,
        linear_x: f32,
        angular_z: f32,
    },
    Rearm,
    EmergencyStop(Option<String>),
    Status,
    Sources,
    Help,
    Quit,
}

/// Parse one line of operator input.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    match head {
        "/intent" => {
            let (Some(source_id), Some(vx), Some(wz), None) =
                (words.next(), words.next(), words.next(), words.next())
            else {
                return Err("usage: /intent <source> <vx> <wz>".to_string());
            };
            let linear_x = vx
                .parse::<f32>()
                .map_err(|_| format!("'{vx}' is not a number"))?;
            let angular_z = wz
                .parse::<f32>()
                .map_err(|_| format!("'{wz}' is not a number"))?;
            Ok(Command::Intent {
                source_id: source_id.to_string(),
                linear_x,
                angular_z,
            })
        }
        "/rearm" => Ok(Command::Rearm),
        "/estop" => {
            let reason = words.collect::<Vec<_>>().join(" ");
            Ok(Command::EmergencyStop((!reason.is_empty()).then_some(reason)))
        }
        "/status" => Ok(Command::Status),
        "/sources" => Ok(Command::Sources),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

/// What the shell talks to.
pub struct Shell {
    pub handle: CoordinatorHandle,
    pub registry: Arc<CommandSourceRegistry>,
    /// Ingress channel per source id.
    pub senders: BTreeMap<String, mpsc::Sender<VelocityIntent>>,
}

/// Entry point for the interactive shell.
///
/// Returns when the operator quits, input ends, or `shutdown` is raised.
/// Ctrl-C at the prompt is treated as an emergency stop.
pub fn run(shell: &Shell, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };
    let prompt = format!("{} ", "rover>".bold().cyan());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                shell.handle.emergency_stop("operator Ctrl-C");
                println!("{}", "⚠  Emergency stop sent.".yellow().bold());
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match parse(line) {
            Ok(Command::Quit) => {
                println!("{}", "Stopping rover.".green());
                break;
            }
            Ok(command) => execute(shell, command),
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e,
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn execute(shell: &Shell, command: Command) {
    match command {
        Command::Intent {
            source_id,
            linear_x,
            angular_z,
        } => cmd_intent(shell, &source_id, linear_x, angular_z),
        Command::Rearm => {
            shell.handle.rearm();
            println!("{}", "✓ Re-arm requested.".green());
        }
        Command::EmergencyStop(reason) => {
            shell
                .handle
                .emergency_stop(reason.unwrap_or_else(|| "operator".to_string()));
            println!("{}", "⚠  Emergency stop sent.".yellow().bold());
        }
        Command::Status => cmd_status(shell),
        Command::Sources => cmd_sources(shell),
        Command::Help => cmd_help(),
        Command::Quit => {}
    }
}

fn cmd_help() {
    println!();
    println!("{}", "rover-drive Commands".bold().underline());
    println!("  {}  – inject an intent", "/intent <source> <vx> <wz>".bold().cyan());
    println!("  {}                      – leave SAFE_STOP", "/rearm".bold().cyan());
    println!("  {}             – emergency stop", "/estop [reason]".bold().cyan());
    println!("  {}                     – latest diagnostic report", "/status".bold().cyan());
    println!("  {}                    – source freshness", "/sources".bold().cyan());
    println!("  {}                – stop the rover and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_intent(shell: &Shell, source_id: &str, linear_x: f32, angular_z: f32) {
    let Some(tx) = shell.senders.get(source_id) else {
        println!("{} '{}'", "Unknown source:".red(), source_id.yellow());
        return;
    };
    match tx.try_send(VelocityIntent::new(source_id, linear_x, 0.0, angular_z)) {
        Ok(()) => println!(
            "  {} {} vx={} wz={}",
            "→".green(),
            source_id.bold(),
            linear_x,
            angular_z
        ),
        Err(e) => println!("{}: {}", "Intent not queued".red(), e),
    }
}

fn cmd_status(shell: &Shell) {
    let state = shell.handle.state();
    println!("{}", "Coordinator".bold().underline());
    println!("  State  : {}", paint_state(&state));

    let Some(report) = shell.handle.latest_report() else {
        println!("  {}", "no cycle completed yet".dimmed());
        return;
    };
    println!("  Cycle  : {}", report.cycle);
    println!(
        "  Streaks: none-fresh {}  dispatch-failures {}",
        report.consecutive_none_fresh, report.consecutive_dispatch_failures
    );
    if let Some(reason) = &report.safe_stop_reason {
        println!("  Stopped: {}", reason.yellow());
    }
    for target in &report.dispatched {
        let measured = report
            .feedback
            .iter()
            .find(|f| f.actuator_id == target.actuator_id)
            .map(|f| format!("{:.3}", f.measured))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "    {:<18} {:>8.3}  (measured {})",
            target.actuator_id,
            target.command.value(),
            measured.dimmed()
        );
    }
}

fn cmd_sources(shell: &Shell) {
    let snapshot = shell.registry.snapshot();
    let verdicts = watchdog::assess(&snapshot, shell.registry.clock().now());

    println!("{}", "Command Sources".bold().underline());
    for (state, verdict) in snapshot.iter().zip(&verdicts) {
        let marker = if state.source.is_safety_override { "override" } else { "" };
        let freshness = match verdict.freshness {
            Freshness::Fresh { age } => format!("fresh ({} ms)", age.as_millis()).green(),
            Freshness::Stale { age } => format!("stale ({} ms)", age.as_millis()).yellow(),
            Freshness::NeverHeard => "never heard".dimmed(),
        };
        println!(
            "  {:<12} p={:<4} {:<8} {}",
            state.source_id().bold(),
            state.source.priority,
            marker.red(),
            freshness
        );
    }
}

fn paint_state(state: &CoordinatorState) -> colored::ColoredString {
    let text = state.to_string();
    match state {
        CoordinatorState::Active(_) => text.green().bold(),
        CoordinatorState::Degraded => text.yellow().bold(),
        CoordinatorState::SafeStop => text.red().bold(),
        CoordinatorState::Init => text.cyan(),
    }
}
