//! Interactive console for the OS simulator.
//!
//! A line-based command loop over the simulator core: `initialize` loads
//! the config and starts the clock and scheduler; `screen` commands submit
//! and inspect processes; `process-smi`, `vmstat`, and `report-util` read
//! the aggregated statistics.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use ossim::{ProcessManager, ProcessState, SimConfig, SimOptions, SubmitError};

/// File written by the `report-util` command.
const REPORT_FILE: &str = "csopesy-log.txt";

const BANNER: &str = r"
  ___  ____ ____ ___ __  __
 / _ \/ ___/ ___|_ _|  \/  |
| | | \___ \___ \| || |\/| |
| |_| |___) |__) | || |  | |
 \___/|____/____/___|_|  |_|
";

/// Interactive console for the OS simulator.
#[derive(Parser)]
#[command(name = "ossim")]
struct Cli {
    /// Path to the configuration file read by `initialize`.
    #[arg(short, long, default_value = "config.txt")]
    config: PathBuf,

    /// Path of the backing-store file.
    #[arg(long, default_value = ossim::DEFAULT_BACKING_STORE)]
    backing_store: PathBuf,

    /// Directory for periodic memory_stamp_<n>.txt snapshots.
    #[arg(long, value_name = "DIR")]
    memory_stamps: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    print_header();

    let stdin = io::stdin();
    let mut manager: Option<Arc<ProcessManager>> = None;

    loop {
        print!("Enter a command: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let command = line.trim();

        if manager.is_none() && !matches!(command, "initialize" | "exit" | "") {
            println!("Please initialize the simulator first with \"initialize\".");
            continue;
        }

        match command {
            "" => {}
            "initialize" => {
                if let Some(old) = manager.take() {
                    old.shutdown();
                }
                match initialize(&cli) {
                    Ok(initialized) => {
                        manager = Some(initialized);
                        println!("Simulator initialized.");
                    }
                    Err(err) => eprintln!("initialize failed: {err:#}"),
                }
            }
            "screen -ls" => print!("{}", manager.as_ref().unwrap().process_table()),
            "scheduler-test" => {
                if manager.as_ref().unwrap().start_batch() {
                    println!("Batch process generation started.");
                } else {
                    println!("\"scheduler-test\" is already running.");
                }
            }
            "scheduler-stop" => {
                if manager.as_ref().unwrap().stop_batch() {
                    println!("Batch process generation stopped.");
                } else {
                    println!("\"scheduler-test\" is not running.");
                }
            }
            "process-smi" => print!("{}", manager.as_ref().unwrap().process_smi()),
            "vmstat" => print!("{}", manager.as_ref().unwrap().vmstat()),
            "report-util" => match manager.as_ref().unwrap().write_report(REPORT_FILE) {
                Ok(path) => println!("Report saved to {}", path.display()),
                Err(err) => eprintln!("report-util failed: {err:#}"),
            },
            "clear" => {
                clear_screen();
                print_header();
            }
            "exit" => {
                if let Some(manager) = manager.take() {
                    manager.shutdown();
                }
                println!("Exiting...");
                break;
            }
            _ => {
                if let Some(name) = command.strip_prefix("screen -s ") {
                    create_screen(manager.as_ref().unwrap(), name.trim());
                } else if let Some(name) = command.strip_prefix("screen -r ") {
                    attach_screen(manager.as_ref().unwrap(), name.trim(), &stdin);
                } else {
                    println!("Unknown command. Please try again.");
                }
            }
        }
    }

    Ok(())
}

fn initialize(cli: &Cli) -> Result<Arc<ProcessManager>> {
    let config = SimConfig::load(&cli.config)?;
    let options = SimOptions {
        backing_store: cli.backing_store.clone(),
        memory_stamps: cli.memory_stamps.clone(),
        ..SimOptions::default()
    };
    ProcessManager::new(config, options)
}

fn create_screen(manager: &Arc<ProcessManager>, name: &str) {
    if name.is_empty() {
        println!("Usage: screen -s <name>");
        return;
    }
    match manager.submit(name) {
        Ok(process) => {
            println!("Created screen: {name}");
            show_process(&process);
        }
        Err(SubmitError::DuplicateName(_)) => {
            println!("Screen '{name}' already exists.");
        }
        Err(err) => println!("Could not create '{name}': {err}"),
    }
}

fn attach_screen(manager: &Arc<ProcessManager>, name: &str, stdin: &io::Stdin) {
    let process = match manager.lookup(name) {
        Some(process) if process.state() != ProcessState::Finished => process,
        _ => {
            println!("Process {name} not found.");
            return;
        }
    };

    show_process(&process);
    println!("Type 'process-smi' to refresh, 'exit' to return.");
    loop {
        print!("[{name}] Enter a command: ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        match line.trim() {
            "process-smi" => {
                if process.state() == ProcessState::Finished {
                    println!("Finished!");
                } else {
                    show_process(&process);
                }
            }
            "exit" => {
                clear_screen();
                print_header();
                return;
            }
            _ => println!("Unknown command. Please try again."),
        }
    }
}

fn show_process(process: &ossim::Process) {
    println!("Process: {}", process.name());
    println!("ID: {}", process.pid());
    println!("Created at: {}", process.created_at());
    println!(
        "Current instruction line: {} / {}",
        process.pc(),
        process.program_len()
    );
    for line in process.output().iter().rev().take(5).rev() {
        println!("  {line}");
    }
    println!();
}

fn print_header() {
    println!("{BANNER}");
    println!("------------------------------------------");
    println!("Welcome to the ossim command line!");
    println!("Type 'exit' to quit, 'clear' to clear the screen.");
    println!("------------------------------------------");
}

fn clear_screen() {
    // ANSI clear + cursor home; good enough for the terminals we target.
    print!("\x1b[2J\x1b[H");
}
