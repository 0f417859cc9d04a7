// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::{
    path::Path,
    process::{Child, Command, ExitStatus},
    thread,
    time::Duration,
};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// The daemon started as a child process. Killed on drop if still alive.
pub struct IntervaldGuard {
    child: Child,
}

impl IntervaldGuard {
    /// Starts the daemon via `cargo run`, logging into `log_file`.
    pub fn start(log_file: &Path, extra_args: &[&str]) -> std::io::Result<Self> {
        println!("Executing intervald located via cargo run");
        let child = Command::new("cargo")
            .args(["run", "-q", "-p", "intervald", "--"])
            .arg("--log-file")
            .arg(log_file)
            .args(extra_args)
            .spawn()?;
        Ok(Self { child })
    }

    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    /// Sends `signal` and waits up to `timeout` for the process to exit.
    pub fn stop_with(&mut self, signal: Signal, timeout: Duration) -> Option<ExitStatus> {
        let _ = signal::kill(self.pid(), signal);
        let polls = (timeout.as_millis() / 100).max(1);
        for _ in 0..polls {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            thread::sleep(Duration::from_millis(100));
        }
        None
    }
}

impl Drop for IntervaldGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        // First: SIGTERM
        if self.stop_with(Signal::SIGTERM, Duration::from_secs(1)).is_some() {
            return;
        }
        // Still alive: SIGKILL
        let _ = signal::kill(self.pid(), Signal::SIGKILL);
        let _ = self.child.wait();
    }
}
