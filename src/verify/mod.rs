// src/verify/mod.rs

//! Post-install smoke test
//!
//! Launches the installed daemon against a throwaway configuration bound to
//! a free local port, waits for its startup banner, then performs one
//! protocol exchange over TCP:
//!
//! ```text
//! NotStarted -> ProcessSpawned -> AwaitingBanner -> ConnectionOpen
//!            -> PingSent -> PingAcknowledged -> Closed
//! ```
//!
//! Any step can fall into `Failed`. `Skipped` is reached directly from
//! `NotStarted` when one of the recipe's skip rules applies.

mod launcher;

pub use launcher::{DaemonHandle, DaemonLauncher, ProcessLauncher};

use crate::error::{Error, Result};
use crate::mpdconf::MpdConfig;
use crate::platform::Platform;
use crate::recipe::format::{Recipe, TestSection};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Address the daemon is bound to during the test
const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// States of a smoke test session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyState {
    NotStarted,
    ProcessSpawned,
    AwaitingBanner,
    ConnectionOpen,
    PingSent,
    PingAcknowledged,
    Closed,
    Failed,
    Skipped,
}

impl VerifyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VerifyState::Closed | VerifyState::Failed | VerifyState::Skipped)
    }

    /// Whether `next` is a legal successor
    fn allows(&self, next: VerifyState) -> bool {
        use VerifyState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (NotStarted, ProcessSpawned | Skipped) => true,
            (ProcessSpawned, AwaitingBanner) => true,
            (AwaitingBanner, ConnectionOpen) => true,
            (ConnectionOpen, PingSent) => true,
            (PingSent, PingAcknowledged) => true,
            (PingAcknowledged, Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VerifyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyState::NotStarted => "not started",
            VerifyState::ProcessSpawned => "process spawned",
            VerifyState::AwaitingBanner => "awaiting banner",
            VerifyState::ConnectionOpen => "connection open",
            VerifyState::PingSent => "ping sent",
            VerifyState::PingAcknowledged => "ping acknowledged",
            VerifyState::Closed => "closed",
            VerifyState::Failed => "failed",
            VerifyState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Tracks the state of one smoke test run
#[derive(Debug)]
struct Session {
    history: Vec<VerifyState>,
}

impl Session {
    fn new() -> Self {
        Self {
            history: vec![VerifyState::NotStarted],
        }
    }

    fn state(&self) -> VerifyState {
        self.history.last().copied().unwrap_or(VerifyState::NotStarted)
    }

    fn advance(&mut self, next: VerifyState) {
        let current = self.state();
        debug_assert!(current.allows(next), "illegal transition {} -> {}", current, next);
        debug!("Smoke test: {} -> {}", current, next);
        self.history.push(next);
    }

    /// Record a failure and hand the error back
    fn fail(&mut self, error: Error) -> Error {
        if !self.state().is_terminal() {
            warn!("Smoke test failed while {}: {}", self.state(), error);
            self.history.push(VerifyState::Failed);
        }
        error
    }
}

/// Outcome of a smoke test that did not fail
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    /// Every state the session passed through
    pub history: Vec<VerifyState>,
    pub port: Option<u16>,
    /// Banner line the daemon printed
    pub banner: Option<String>,
    pub greeting: Option<String>,
    pub response: Option<String>,
    /// Why the test was skipped
    pub skip_reason: Option<String>,
}

impl VerifyReport {
    pub fn state(&self) -> VerifyState {
        self.history.last().copied().unwrap_or(VerifyState::NotStarted)
    }

    pub fn passed(&self) -> bool {
        self.state() == VerifyState::Closed
    }

    pub fn skipped(&self) -> bool {
        self.state() == VerifyState::Skipped
    }
}

/// Reserve a currently unused TCP port on the loopback interface
///
/// The port is released before returning; the daemon binds it next.
pub fn allocate_port() -> Result<u16> {
    let listener = TcpListener::bind(SocketAddr::from((LOOPBACK, 0)))?;
    Ok(listener.local_addr()?.port())
}

/// Runs a recipe's smoke test
pub struct Verifier {
    platform: Platform,
    launcher: Arc<dyn DaemonLauncher>,
    /// Overrides the recipe's banner timeout
    banner_timeout: Option<Duration>,
    /// Timeout for each socket read or write
    io_timeout: Duration,
}

impl Verifier {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            launcher: Arc::new(ProcessLauncher::new()),
            banner_timeout: None,
            io_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn DaemonLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = Some(timeout);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Smoke test the recipe's daemon installed in `bin_dir`
    ///
    /// Refuses to run when the daemon binary is not installed. A skipped
    /// test is `Ok` with [`VerifyReport::skipped`] set; every failure is an
    /// `Err`.
    pub fn verify(&self, recipe: &Recipe, bin_dir: &Path) -> Result<VerifyReport> {
        let test = recipe.test.as_ref().ok_or_else(|| {
            Error::NotFound(format!("{} declares no smoke test", recipe.package.name))
        })?;

        let mut session = Session::new();
        let mut report = VerifyReport {
            history: Vec::new(),
            port: None,
            banner: None,
            greeting: None,
            response: None,
            skip_reason: None,
        };

        if let Some(reason) = test.skip_reason(&self.platform) {
            info!("Skipping smoke test: {}", reason);
            session.advance(VerifyState::Skipped);
            report.skip_reason = Some(reason);
            report.history = session.history;
            return Ok(report);
        }

        let program = bin_dir.join(&test.binary);
        if !program.is_file() {
            return Err(Error::NotFound(format!(
                "{} is not installed; run the install first",
                program.display()
            )));
        }

        let result = self.run_session(recipe, test, &program, &mut session, &mut report);
        report.history = session.history;
        result.map(|()| report)
    }

    fn run_session(
        &self,
        recipe: &Recipe,
        test: &TestSection,
        program: &Path,
        session: &mut Session,
        report: &mut VerifyReport,
    ) -> Result<()> {
        let port = allocate_port().map_err(|e| session.fail(e))?;
        report.port = Some(port);

        let scratch = tempfile::tempdir().map_err(|e| session.fail(e.into()))?;
        let config_path = scratch.path().join("mpd.conf");
        fs::write(&config_path, MpdConfig::bound_to(&LOOPBACK.to_string(), port).render())
            .map_err(|e| session.fail(e.into()))?;

        let config = config_path.display().to_string();
        let args: Vec<String> = test
            .args
            .iter()
            .map(|a| recipe.substitute(a, &[("config", &config)]))
            .collect();

        info!("Starting {} on port {}", program.display(), port);
        let mut daemon = self
            .launcher
            .launch(program, &args)
            .map_err(|e| session.fail(e))?;
        session.advance(VerifyState::ProcessSpawned);

        let result = self.exchange(test, port, daemon.as_ref(), session, report);

        if let Err(e) = daemon.terminate() {
            warn!("Failed to stop daemon: {}", e);
        }
        result
    }

    fn exchange(
        &self,
        test: &TestSection,
        port: u16,
        daemon: &dyn DaemonHandle,
        session: &mut Session,
        report: &mut VerifyReport,
    ) -> Result<()> {
        session.advance(VerifyState::AwaitingBanner);
        let banner = test.banner_for(&self.platform);
        let timeout = self
            .banner_timeout
            .unwrap_or(Duration::from_secs(test.timeout_secs));

        let line = wait_for_banner(daemon, banner, timeout).map_err(|e| session.fail(e))?;
        debug!("Banner: {}", line);
        report.banner = Some(line);

        let stream = TcpStream::connect_timeout(&SocketAddr::from((LOOPBACK, port)), self.io_timeout)
            .map_err(|e| session.fail(self.socket_error("connection", e)))?;
        stream
            .set_read_timeout(Some(self.io_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.io_timeout)))
            .map_err(|e| session.fail(e.into()))?;
        session.advance(VerifyState::ConnectionOpen);

        let mut writer = stream.try_clone().map_err(|e| session.fail(e.into()))?;
        let mut reader = BufReader::new(stream);

        let greeting = self
            .read_reply(&mut reader, "greeting")
            .map_err(|e| session.fail(e))?;
        expect_fragment(&test.greeting, &greeting).map_err(|e| session.fail(e))?;
        report.greeting = Some(greeting);

        writer
            .write_all(format!("{}\n", test.command).as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| session.fail(self.socket_error(&test.command, e)))?;
        session.advance(VerifyState::PingSent);

        let response = self
            .read_reply(&mut reader, &format!("reply to {}", test.command))
            .map_err(|e| session.fail(e))?;
        expect_fragment(&test.ack, &response).map_err(|e| session.fail(e))?;
        report.response = Some(response);
        session.advance(VerifyState::PingAcknowledged);

        let _ = writer.shutdown(std::net::Shutdown::Both);
        session.advance(VerifyState::Closed);
        info!("Smoke test passed on port {}", port);
        Ok(())
    }

    fn read_reply(&self, reader: &mut BufReader<TcpStream>, what: &str) -> Result<String> {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => Err(Error::VerificationProtocolMismatch {
                expected: what.to_string(),
                got: "connection closed".to_string(),
            }),
            Ok(_) => Ok(line.trim_end().to_string()),
            Err(e) => Err(self.socket_error(what, e)),
        }
    }

    fn socket_error(&self, what: &str, e: std::io::Error) -> Error {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::VerificationTimeout {
                waiting_for: what.to_string(),
                seconds: self.io_timeout.as_secs(),
            },
            _ => Error::Io(e),
        }
    }
}

/// Drain daemon output until a line contains `banner` or the deadline passes
fn wait_for_banner(daemon: &dyn DaemonHandle, banner: &str, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut last_line = None;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match daemon.lines().recv_timeout(remaining) {
            Ok(line) => {
                debug!("daemon: {}", line);
                if line.contains(banner) {
                    return Ok(line);
                }
                last_line = Some(line);
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::VerificationProtocolMismatch {
                    expected: banner.to_string(),
                    got: last_line.unwrap_or_else(|| "daemon exited without output".to_string()),
                });
            }
        }
    }

    Err(Error::VerificationTimeout {
        waiting_for: format!("banner \"{}\"", banner),
        seconds: timeout.as_secs(),
    })
}

fn expect_fragment(expected: &str, got: &str) -> Result<()> {
    if got.contains(expected) {
        Ok(())
    } else {
        Err(Error::VerificationProtocolMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_port_is_bindable() {
        let port = allocate_port().unwrap();
        assert_ne!(port, 0);
        TcpListener::bind((LOOPBACK, port)).unwrap();
    }

    #[test]
    fn test_transitions() {
        use VerifyState::*;
        assert!(NotStarted.allows(ProcessSpawned));
        assert!(NotStarted.allows(Skipped));
        assert!(AwaitingBanner.allows(Failed));
        assert!(!AwaitingBanner.allows(PingSent));
        assert!(!Closed.allows(Failed));
        assert!(!Skipped.allows(ProcessSpawned));
    }

    #[test]
    fn test_session_fail_is_absorbing() {
        let mut session = Session::new();
        session.advance(VerifyState::ProcessSpawned);
        let _ = session.fail(Error::NotFound("x".to_string()));
        let _ = session.fail(Error::NotFound("y".to_string()));
        assert_eq!(
            session.history,
            vec![VerifyState::NotStarted, VerifyState::ProcessSpawned, VerifyState::Failed]
        );
    }

    #[test]
    fn test_expect_fragment() {
        assert!(expect_fragment("OK MPD", "OK MPD 0.23.5").is_ok());
        assert!(matches!(
            expect_fragment("OK", "ACK [5@0] {} unknown command"),
            Err(Error::VerificationProtocolMismatch { .. })
        ));
    }
}
