//! Command line access to the Marlin gantry controller.
//!
//! Subcommands:
//! - `ports`: List serial ports
//! - `send`: Send one G-code command and print the response
//! - `read`: Take a single sensor reading at the current position
//! - `console`: Interactive G-code REPL

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lcdmap_hardware::marlin::{MarlinLink, Sensor, DEFAULT_BAUD, DEFAULT_PORT};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;

/// Marlin gantry control tool
#[derive(Parser, Debug)]
#[command(name = "marlin_tool")]
#[command(about = "Talk to the Marlin controller of the LCD mapping gantry")]
#[command(version)]
struct Args {
    /// Serial port of the controller
    #[arg(long, global = true, default_value = DEFAULT_PORT)]
    port: String,

    /// Serial baud rate
    #[arg(long, global = true, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports,

    /// Send one command and print its response
    Send {
        /// G-code line, e.g. "G28" or "M5500"
        gcode: String,

        /// Response timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Read the sensor once at the current head position
    Read {
        /// Sensor to read (TSL2561 or AS7341)
        #[arg(short, long, default_value = "TSL2561")]
        sensor: Sensor,
    },

    /// Interactive G-code console
    Console,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Ports => cmd_ports(),
        Command::Send { gcode, timeout } => {
            let mut link = connect(&args.port, args.baud)?;
            cmd_send(&mut link, &gcode, Duration::from_secs(timeout))
        }
        Command::Read { sensor } => {
            let mut link = connect(&args.port, args.baud)?;
            cmd_read(&mut link, sensor)
        }
        Command::Console => {
            let mut link = connect(&args.port, args.baud)?;
            cmd_console(&mut link)
        }
    }
}

fn connect(port: &str, baud: u32) -> Result<MarlinLink> {
    info!("Connecting to {port}...");
    let mut link = MarlinLink::connect(port, baud)?;
    link.wait_for_boot().context("waiting for controller boot")?;
    Ok(link)
}

fn cmd_ports() -> Result<()> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn cmd_send(link: &mut MarlinLink, gcode: &str, timeout: Duration) -> Result<()> {
    for line in link.execute(gcode, timeout)? {
        println!("{line}");
    }
    println!("ok");
    Ok(())
}

fn cmd_read(link: &mut MarlinLink, sensor: Sensor) -> Result<()> {
    let response = link.command(sensor.direct_command())?;
    let token = response
        .first()
        .with_context(|| format!("{sensor} returned no data"))?;
    println!("{sensor}: {}", sensor.interpret(token)?);
    Ok(())
}

const HISTORY_MAX_LINES: usize = 500;

fn history_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let config_dir = Path::new(&home).join(".config");
    std::fs::create_dir_all(&config_dir).ok()?;
    Some(config_dir.join("marlin_tool_hist.txt"))
}

fn truncate_history_file(path: &Path, max_lines: usize) {
    if let Ok(contents) = std::fs::read_to_string(path) {
        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() > max_lines {
            let kept = &lines[lines.len() - max_lines..];
            let _ = std::fs::write(path, kept.join("\n") + "\n");
        }
    }
}

fn cmd_console(link: &mut MarlinLink) -> Result<()> {
    println!("Connected to {}", link.name());
    println!();
    println!("Marlin console - one G-code command per line, 'quit' to exit");
    println!("Examples: G28, G0 X10 Y20 F3000, M400, M5500");
    println!();

    let mut rl = DefaultEditor::new()?;

    let history = history_path();
    if let Some(ref path) = history {
        truncate_history_file(path, HISTORY_MAX_LINES);
        if path.exists() {
            let _ = rl.load_history(path);
        }
    }

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);
                if let Some(ref path) = history {
                    let _ = rl.save_history(path);
                }

                if cmd.eq_ignore_ascii_case("quit") || cmd.eq_ignore_ascii_case("exit") {
                    println!("Bye!");
                    break;
                }

                match link.command(cmd) {
                    Ok(response) => {
                        for line in response {
                            println!("{line}");
                        }
                        println!("ok");
                    }
                    // The link stays usable; stale output is discarded on the next command
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {err}");
                break;
            }
        }
    }

    Ok(())
}
