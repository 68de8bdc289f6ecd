// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use mpd_kitchen::mpdconf::MpdConfig;
use mpd_kitchen::recipe::format::Dependency;
use mpd_kitchen::recipe::kitchen::{
    BuildPhase, BuildRunner, BuildStep, DependencyResolver, StepOutput,
};
use mpd_kitchen::service::{ProcessSupervisor, ServiceDescriptor};
use mpd_kitchen::verify::{DaemonHandle, DaemonLauncher};
use mpd_kitchen::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Banner MPD prints on Linux once an output is ready
pub const LINUX_BANNER: &str = "output: Successfully detected a alsa audio device";

/// A step the recording runner saw
#[derive(Debug, Clone)]
pub struct RecordedStep {
    pub step: BuildStep,
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
}

/// Build runner that records steps and fakes `meson install`
///
/// The install step creates `<keg>/bin/<binary>` for every binary given.
pub struct RecordingRunner {
    pub steps: Mutex<Vec<RecordedStep>>,
    keg: PathBuf,
    binaries: Vec<String>,
    fail_phase: Option<BuildPhase>,
}

impl RecordingRunner {
    pub fn new(keg: &Path, binaries: &[&str]) -> Self {
        Self {
            steps: Mutex::new(Vec::new()),
            keg: keg.to_path_buf(),
            binaries: binaries.iter().map(|b| b.to_string()).collect(),
            fail_phase: None,
        }
    }

    pub fn failing_at(mut self, phase: BuildPhase) -> Self {
        self.fail_phase = Some(phase);
        self
    }

    pub fn phases(&self) -> Vec<BuildPhase> {
        self.steps.lock().unwrap().iter().map(|r| r.step.phase).collect()
    }

    pub fn recorded(&self, phase: BuildPhase) -> Option<RecordedStep> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.step.phase == phase)
            .cloned()
    }
}

impl BuildRunner for RecordingRunner {
    fn run(
        &self,
        step: &BuildStep,
        workdir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<StepOutput> {
        self.steps.lock().unwrap().push(RecordedStep {
            step: step.clone(),
            workdir: workdir.to_path_buf(),
            env: env.clone(),
        });

        if self.fail_phase == Some(step.phase) {
            return Ok(StepOutput {
                phase: step.phase,
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("ERROR: {} exploded", step.phase),
            });
        }

        if step.phase == BuildPhase::Install {
            let bin = self.keg.join("bin");
            fs::create_dir_all(&bin)?;
            for name in &self.binaries {
                fs::write(bin.join(name), b"#!/bin/sh\nexit 0\n")?;
            }
        }

        Ok(StepOutput {
            phase: step.phase,
            success: true,
            exit_code: Some(0),
            stdout: format!("{} ok\n", step.phase),
            stderr: String::new(),
        })
    }
}

/// Resolver backed by an in-memory set of installed names
pub struct MockResolver {
    installed: Mutex<HashSet<String>>,
    installable: HashSet<String>,
    pub checked: AtomicUsize,
}

impl MockResolver {
    /// A resolver where every name in `installed` is present
    pub fn with_installed(installed: &[&str]) -> Self {
        Self {
            installed: Mutex::new(installed.iter().map(|s| s.to_string()).collect()),
            installable: HashSet::new(),
            checked: AtomicUsize::new(0),
        }
    }

    /// A resolver that can install anything
    pub fn permissive() -> Self {
        Self {
            installed: Mutex::new(HashSet::new()),
            installable: HashSet::from(["*".to_string()]),
            checked: AtomicUsize::new(0),
        }
    }
}

impl DependencyResolver for MockResolver {
    fn check_missing(&self, deps: &[&Dependency]) -> Result<Vec<String>> {
        self.checked.fetch_add(deps.len(), Ordering::SeqCst);
        let installed = self.installed.lock().unwrap();
        Ok(deps
            .iter()
            .filter(|d| !installed.contains(&d.name))
            .map(|d| d.name.clone())
            .collect())
    }

    fn install(&self, names: &[String]) -> Result<Vec<String>> {
        let mut installed = self.installed.lock().unwrap();
        let done: Vec<String> = names
            .iter()
            .filter(|n| self.installable.contains("*") || self.installable.contains(*n))
            .cloned()
            .collect();
        installed.extend(done.iter().cloned());
        Ok(done)
    }
}

/// Supervisor that keeps descriptors in memory
#[derive(Default)]
pub struct RecordingSupervisor {
    pub registered: Mutex<Vec<ServiceDescriptor>>,
}

impl ProcessSupervisor for RecordingSupervisor {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn register(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf> {
        self.registered.lock().unwrap().push(descriptor.clone());
        Ok(PathBuf::from(format!("/dev/null/{}", descriptor.label)))
    }
}

/// An unpacked MPD source tree with the config template in place
pub fn fake_source_tree(root: &Path, template: &str) -> PathBuf {
    let source = root.join("mpd-0.23.8");
    fs::create_dir_all(source.join("doc")).unwrap();
    fs::write(source.join("meson.build"), "project('mpd', 'cpp')\n").unwrap();
    fs::write(source.join("doc/mpdconf.example"), template).unwrap();
    source
}

/// A keg containing an `mpd` binary, as left behind by an install
pub fn fake_installed_bin(root: &Path) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir_in(root).unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    fs::write(bin.join("mpd"), b"#!/bin/sh\n").unwrap();
    (dir, bin)
}

/// How the fake daemon behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMpd {
    /// Banner, greeting, answers `ping` with `OK`
    Healthy,
    /// Starts but never prints its banner
    Silent,
    /// Prints the banner, then greets with something that is not MPD
    WrongGreeting,
    /// Greets correctly but rejects `ping`
    RejectsPing,
    /// Prints a line and exits
    Crashes,
}

/// Launcher that plays MPD in-process
///
/// Reads the port from the generated config, listens on it and speaks just
/// enough of the protocol for the smoke test.
pub struct FakeMpdLauncher {
    mode: FakeMpd,
    pub connections: Arc<AtomicUsize>,
    pub terminated: Arc<AtomicBool>,
    pub launched_args: Mutex<Vec<String>>,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl FakeMpdLauncher {
    pub fn new(mode: FakeMpd) -> Self {
        Self {
            mode,
            connections: Arc::new(AtomicUsize::new(0)),
            terminated: Arc::new(AtomicBool::new(false)),
            launched_args: Mutex::new(Vec::new()),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl DaemonLauncher for FakeMpdLauncher {
    fn launch(&self, _program: &Path, args: &[String]) -> Result<Box<dyn DaemonHandle>> {
        *self.launched_args.lock().unwrap() = args.to_vec();

        let config_path = args
            .last()
            .ok_or_else(|| Error::NotFound("config argument".to_string()))?;
        let config = MpdConfig::parse(&fs::read_to_string(config_path)?)?;
        let address = config.get("bind_to_address").unwrap_or("127.0.0.1").to_string();
        let port: u16 = config
            .get("port")
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| Error::ParseError("port".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        if self.mode == FakeMpd::Crashes {
            tx.send("exception: Failed to open audio output".to_string()).ok();
            return Ok(Box::new(FakeHandle {
                lines: rx,
                tx: None,
                stop,
                terminated: Arc::clone(&self.terminated),
            }));
        }

        let listener = TcpListener::bind((address.as_str(), port))?;
        listener.set_nonblocking(true)?;

        let mode = self.mode;
        let connections = Arc::clone(&self.connections);
        let received = Arc::clone(&self.received);
        let thread_stop = Arc::clone(&stop);
        thread::spawn(move || serve(listener, mode, connections, received, thread_stop));

        tx.send("config: loading file mpd.conf".to_string()).ok();
        if mode != FakeMpd::Silent {
            tx.send(LINUX_BANNER.to_string()).ok();
        }

        Ok(Box::new(FakeHandle {
            lines: rx,
            tx: Some(tx),
            stop,
            terminated: Arc::clone(&self.terminated),
        }))
    }
}

fn serve(
    listener: TcpListener,
    mode: FakeMpd,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(_) => return,
        };
        connections.fetch_add(1, Ordering::SeqCst);
        if stream.set_nonblocking(false).is_err() {
            return;
        }

        let Ok(mut writer) = stream.try_clone() else { return };
        let greeting = match mode {
            FakeMpd::WrongGreeting => "SSH-2.0-OpenSSH_9.6\n",
            _ => "OK MPD 0.23.5\n",
        };
        if writer.write_all(greeting.as_bytes()).is_err() {
            continue;
        }

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
            let command = line.trim_end().to_string();
            received.lock().unwrap().push(command.clone());
            let reply = match (mode, command.as_str()) {
                (FakeMpd::RejectsPing, _) => "ACK [5@0] {ping} unknown command\n",
                (_, "ping") => "OK\n",
                _ => "ACK [5@0] {} unknown command\n",
            };
            if writer.write_all(reply.as_bytes()).is_err() {
                break;
            }
            line.clear();
        }
    }
}

struct FakeHandle {
    lines: Receiver<String>,
    /// Held so the output stream stays open while the daemon "runs"
    tx: Option<Sender<String>>,
    stop: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl DaemonHandle for FakeHandle {
    fn lines(&self) -> &Receiver<String> {
        &self.lines
    }

    fn terminate(&mut self) -> Result<()> {
        self.tx.take();
        self.stop.store(true, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
