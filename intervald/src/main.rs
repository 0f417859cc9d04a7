// SPDX-License-Identifier: MIT
// intervald: runs interval jobs on a bounded worker pool
//
// - Logs to a size-rotated file and to stderr.
// - Stops on SIGINT / SIGTERM, draining running jobs first.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::Parser;
use intervald::logging::LogFacility;
use intervald::{bootstrap, AppConfig};
use nix::sys::signal::{SigSet, Signal};

fn termination_signals() -> SigSet {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask
}

fn main() {
    let config = AppConfig::parse();

    // blocked before any thread exists, so every thread inherits the mask
    // and the signals are only consumed by the wait below
    let signals = termination_signals();
    if let Err(e) = signals.thread_block() {
        eprintln!("Error: failed to block termination signals: {e}");
        std::process::exit(1);
    }

    let app = match bootstrap(config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match signals.wait() {
        Ok(signal) => app
            .logger()
            .info(&format!("Received {}, stopping.", signal.as_str())),
        Err(e) => app
            .logger()
            .error(&format!("Waiting for termination signals failed: {e}")),
    }

    let drain_timeout = app.config().drain_timeout();
    app.shutdown(drain_timeout);
}
