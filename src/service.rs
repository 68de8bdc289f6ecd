// src/service.rs

//! Service descriptors for external process supervisors
//!
//! The kitchen never starts the daemon itself. It builds a
//! [`ServiceDescriptor`] from the recipe's `[service]` section and hands it
//! to a [`ProcessSupervisor`], which renders it in the supervisor's native
//! format (launchd plist, systemd unit) and writes it where the supervisor
//! looks for it. Loading the service is left to the operator.

use crate::error::{Error, Result};
use crate::platform::OsFamily;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Scheduling class of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Background,
    #[default]
    Standard,
    Interactive,
    Adaptive,
}

impl ProcessType {
    /// The launchd `ProcessType` value
    pub fn launchd_name(&self) -> &'static str {
        match self {
            ProcessType::Background => "Background",
            ProcessType::Standard => "Standard",
            ProcessType::Interactive => "Interactive",
            ProcessType::Adaptive => "Adaptive",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessType::Background => f.write_str("background"),
            ProcessType::Standard => f.write_str("standard"),
            ProcessType::Interactive => f.write_str("interactive"),
            ProcessType::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// A long-running process entry for a supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Supervisor label (`io.mpd-kitchen.mpd`)
    pub label: String,
    /// Program and arguments
    pub program_args: Vec<String>,
    /// Restart whenever the process exits
    pub keep_alive: bool,
    pub process_type: ProcessType,
    pub working_dir: Option<PathBuf>,
}

impl ServiceDescriptor {
    /// Label used for a package's service
    pub fn label_for(package: &str) -> String {
        format!("io.mpd-kitchen.{}", package)
    }

    /// Render as a launchd property list
    pub fn to_plist(&self) -> String {
        let mut args = String::new();
        for arg in &self.program_args {
            args.push_str(&format!("    <string>{}</string>\n", xml_escape(arg)));
        }

        let keep_alive = if self.keep_alive { "<true/>" } else { "<false/>" };

        let working_dir = self
            .working_dir
            .as_ref()
            .map(|d| {
                format!(
                    "  <key>WorkingDirectory</key>\n  <string>{}</string>\n",
                    xml_escape(&d.display().to_string())
                )
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{args}  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  {keep_alive}
  <key>ProcessType</key>
  <string>{process_type}</string>
{working_dir}</dict>
</plist>
"#,
            label = xml_escape(&self.label),
            args = args,
            keep_alive = keep_alive,
            process_type = self.process_type.launchd_name(),
            working_dir = working_dir,
        )
    }

    /// Render as a systemd unit
    pub fn to_systemd_unit(&self) -> String {
        let exec = self
            .program_args
            .iter()
            .map(|a| systemd_quote(a))
            .collect::<Vec<_>>()
            .join(" ");

        let mut unit = format!(
            "[Unit]\nDescription={}\n\n[Service]\nType=simple\nExecStart={}\nRestart={}\n",
            self.label,
            exec,
            if self.keep_alive { "always" } else { "no" }
        );

        if let Some(dir) = &self.working_dir {
            unit.push_str(&format!("WorkingDirectory={}\n", dir.display()));
        }

        if self.process_type == ProcessType::Background {
            unit.push_str("Nice=10\nIOSchedulingClass=idle\n");
        }

        unit.push_str("\n[Install]\nWantedBy=default.target\n");
        unit
    }
}

/// An external process supervisor
///
/// `register` only writes the supervisor's configuration; it never starts
/// the process.
pub trait ProcessSupervisor: Send + Sync {
    /// Short supervisor name for logs
    fn name(&self) -> &'static str;

    /// Hand the descriptor to the supervisor; returns the written file
    fn register(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf>;
}

/// launchd user agents (`~/Library/LaunchAgents`)
pub struct LaunchdSupervisor {
    agents_dir: PathBuf,
}

impl LaunchdSupervisor {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.into(),
        }
    }

    pub fn plist_path(&self, descriptor: &ServiceDescriptor) -> PathBuf {
        self.agents_dir.join(format!("{}.plist", descriptor.label))
    }
}

impl ProcessSupervisor for LaunchdSupervisor {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn register(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf> {
        let path = self.plist_path(descriptor);
        write_descriptor(&path, &descriptor.to_plist())?;
        info!("Wrote launchd agent {}", path.display());
        Ok(path)
    }
}

/// systemd user units (`~/.config/systemd/user`)
pub struct SystemdSupervisor {
    unit_dir: PathBuf,
}

impl SystemdSupervisor {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }

    pub fn unit_path(&self, descriptor: &ServiceDescriptor) -> PathBuf {
        self.unit_dir.join(format!("{}.service", descriptor.label))
    }
}

impl ProcessSupervisor for SystemdSupervisor {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn register(&self, descriptor: &ServiceDescriptor) -> Result<PathBuf> {
        let path = self.unit_path(descriptor);
        write_descriptor(&path, &descriptor.to_systemd_unit())?;
        info!("Wrote systemd unit {}", path.display());
        Ok(path)
    }
}

/// The supervisor native to an OS family, rooted at the user's home
pub fn native_supervisor(os: OsFamily, home: &Path) -> Result<Box<dyn ProcessSupervisor>> {
    match os {
        OsFamily::Macos => Ok(Box::new(LaunchdSupervisor::new(
            home.join("Library/LaunchAgents"),
        ))),
        OsFamily::Linux => Ok(Box::new(SystemdSupervisor::new(
            home.join(".config/systemd/user"),
        ))),
        OsFamily::Other => Err(Error::ServiceError(
            "no supported process supervisor on this platform".to_string(),
        )),
    }
}

/// Write atomically so a supervisor never reads a half-written file
fn write_descriptor(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::ServiceError(format!("invalid descriptor path {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn systemd_quote(s: &str) -> String {
    if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}
