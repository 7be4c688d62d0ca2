//! cellbot-io - Drive a paired robot from command lines on stdin
//!
//! Each input line is a generic command (`f`, `w 40 40`, `fd 20 500`, ...),
//! optionally prefixed with a numeric timestamp. Lines starting with `:` are
//! local requests:
//!
//! - `:state` - current controller state
//! - `:odometer [reset]` - odometry string (Create only)
//! - `:reset` - zero the odometry
//! - `:controllers` - available controller labels
//! - `:use <label>|<bt name>|<bt address>` - switch controller / robot

use cellbot_io::config::Config;
use cellbot_io::devices::StaticRegistry;
use cellbot_io::error::{Error, Result};
use cellbot_io::transport::{BluetoothAdapter, MockAdapter, SerialPortAdapter};
use cellbot_io::Coordinator;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::env;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/cellbot-io.toml";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `cellbot-io <path>` (positional)
/// - `cellbot-io --config <path>` (flag-based)
/// - `cellbot-io -c <path>` (short flag)
///
/// Returns `None` when no path was given.
fn parse_config_path(args: &[String]) -> Option<String> {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    args.iter()
        .skip(1)
        .find(|arg| !arg.starts_with('-'))
        .cloned()
}

fn load_config(args: &[String]) -> Result<Config> {
    match parse_config_path(args) {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}

/// Handle one `:` request; returns false for unknown requests
fn handle_local(coordinator: &mut Coordinator, request: &str) -> bool {
    if let Some(target) = request.strip_prefix("use ") {
        let mut fields = target.split('|').map(str::trim);
        let label = fields.next().unwrap_or_default();
        let name = fields.next().unwrap_or_default();
        let address = fields.next().unwrap_or_default();
        match coordinator.set_controller(label, name, address) {
            Ok(()) => {
                let state = coordinator.wait_for_transition(CONNECT_TIMEOUT);
                log::info!("Controller '{}': {}", label, state);
            }
            Err(e) => log::error!("{}", e),
        }
        return true;
    }

    let tokens: Vec<&str> = request.split_whitespace().collect();
    match tokens.as_slice() {
        ["state"] => println!("{}", coordinator.state()),
        ["odometer"] | ["odometer", "reset"] => match coordinator.odometer(tokens.len() == 2) {
            Some(odometer) => println!("{}", odometer),
            None => println!("odometer unavailable"),
        },
        ["reset"] => coordinator.reset_odometer(),
        ["controllers"] => {
            for label in coordinator.available_controllers() {
                println!("{}", label);
            }
        }
        _ => return false,
    }
    true
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("cellbot-io v{} starting...", env!("CARGO_PKG_VERSION"));

    let adapter: Arc<dyn BluetoothAdapter> = if args.iter().any(|a| a == "--mock") {
        log::info!("Using mock adapter (no hardware)");
        Arc::new(MockAdapter::new())
    } else {
        log::info!(
            "Using serial adapter with {} paired device(s)",
            config.transport.paired.len()
        );
        Arc::new(SerialPortAdapter::new(&config.transport))
    };

    let controller = config.controller.clone();
    let mut coordinator = Coordinator::new(Box::new(StaticRegistry::new(adapter, config)));
    log::info!(
        "Available controllers: {}",
        coordinator.available_controllers().join(", ")
    );

    coordinator.set_controller(
        &controller.label,
        &controller.device_name,
        &controller.device_address,
    )?;
    let state = coordinator.wait_for_transition(CONNECT_TIMEOUT);
    if state.is_settled() {
        log::info!("Controller '{}': {}", controller.label, state);
    } else {
        log::warn!(
            "Controller '{}' still {} after {:?}",
            controller.label,
            state,
            CONNECT_TIMEOUT
        );
    }

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Stdin is read on its own thread so Ctrl-C is noticed while idle
    let (line_tx, line_rx) = unbounded::<String>();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| Error::Other(format!("Failed to spawn stdin thread: {}", e)))?;

    while running.load(Ordering::Relaxed) {
        let line = match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Input closed");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix(':') {
            Some(request) => {
                if !handle_local(&mut coordinator, request) {
                    log::warn!("Unknown request ':{}'", request);
                }
            }
            None => coordinator.send_direct_command(line),
        }
    }

    log::info!("Shutting down...");
    coordinator.disconnect();
    log::info!("Shutdown complete");
    Ok(())
}
