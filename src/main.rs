//! nagad - Razer Naga side-button remapping daemon
//!
//! Reads raw input events from the Naga's paired keyboard and mouse
//! interfaces, debounces presses, and dispatches the per-button actions
//! configured in `~/.naga/mapping_01.txt`.

mod config;
mod daemon;
mod device;
mod dispatch;
mod error;
mod exec;

use daemon::Daemon;
use dispatch::Dispatcher;
use error::DaemonError;
use exec::ShellExecutor;
use std::process::Command;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_MAPPING_FILE: &str = "mapping_01.txt";

fn main() {
    // Diagnostics belong on stderr; stdout stays clean for supervisors.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mut mapping_file = DEFAULT_MAPPING_FILE.to_string();
    for arg in std::env::args().skip(1) {
        if arg == "-kill" {
            kill_running_instances();
            return;
        }
        mapping_file = arg;
    }

    info!("starting naga daemon");
    if let Err(e) = run(&mapping_file) {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}

fn run(mapping_file: &str) -> Result<(), DaemonError> {
    let pair = device::open_pair()?;
    let table = config::MappingTable::load(&config::mapping_path(mapping_file))?;
    let dispatcher = Dispatcher::new(table, Arc::new(ShellExecutor));
    let mut daemon = Daemon::new(pair, dispatcher);

    // SIGINT/SIGTERM: release the exclusive grab, close the device, exit.
    // Repeat threads are not drained; they die with the process.
    let cell = daemon.grab_cell();
    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(mut dev) = daemon::lock_cell(&cell).take() {
            let _ = dev.ungrab();
        }
        std::process::exit(0);
    }) {
        warn!("could not install signal handler: {e}");
    }

    daemon.run()
}

/// `-kill`: ask every running instance to terminate, then exit. killall
/// signals this process too, so a clean-exit handler goes in first.
fn kill_running_instances() {
    let _ = ctrlc::set_handler(|| std::process::exit(0));
    info!("signalling running nagad instances to exit");
    let _ = Command::new("killall").arg("nagad").status();
}
