// src/verify/launcher.rs

//! Launching the daemon under test

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Starts the daemon for a smoke test
pub trait DaemonLauncher: Send + Sync {
    /// Start `program` with `args`
    ///
    /// The returned handle streams the daemon's stdout and stderr, merged,
    /// one line at a time. The stream ends when the daemon exits.
    fn launch(&self, program: &Path, args: &[String]) -> Result<Box<dyn DaemonHandle>>;
}

/// A running daemon
///
/// Dropping the handle must stop the daemon.
pub trait DaemonHandle: Send {
    /// Merged output lines
    fn lines(&self) -> &Receiver<String>;

    /// Stop the daemon and reap it
    fn terminate(&mut self) -> Result<()>;
}

/// Launches the daemon as a child process
pub struct ProcessLauncher {
    /// How long to wait for the child to exit after it is killed
    reap_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self {
            reap_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonLauncher for ProcessLauncher {
    fn launch(&self, program: &Path, args: &[String]) -> Result<Box<dyn DaemonHandle>> {
        debug!("Launching {} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::IoError(format!("Failed to launch {}: {}", program.display(), e)))?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump_lines(stderr, tx);
        }

        Ok(Box::new(ChildHandle {
            child: Some(child),
            lines: rx,
            reap_timeout: self.reap_timeout,
        }))
    }
}

/// Forward each line of `reader` into the channel until EOF
fn pump_lines<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

struct ChildHandle {
    child: Option<Child>,
    lines: Receiver<String>,
    reap_timeout: Duration,
}

impl DaemonHandle for ChildHandle {
    fn lines(&self) -> &Receiver<String> {
        &self.lines
    }

    fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            let _ = child.kill();
        }

        match child.wait_timeout(self.reap_timeout)? {
            Some(status) => debug!("Daemon exited with {}", status),
            None => warn!("Daemon did not exit within {}s", self.reap_timeout.as_secs()),
        }
        Ok(())
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("Failed to stop daemon: {}", e);
        }
    }
}
