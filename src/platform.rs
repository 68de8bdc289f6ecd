// src/platform.rs

//! Host platform detection
//!
//! Everything platform-conditional in a recipe (OS-gated dependencies,
//! symbol-rename overrides, the CI skip of the smoke test) is decided against
//! a [`Platform`] value that is detected once and then passed around. Tests
//! construct platforms directly instead of probing the host.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::process::Command;
use tracing::debug;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Macos,
    Linux,
    Other,
}

impl OsFamily {
    /// Family of the running host
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => OsFamily::Macos,
            "linux" => OsFamily::Linux,
            _ => OsFamily::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Macos => "macos",
            OsFamily::Linux => "linux",
            OsFamily::Other => "other",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected (or constructed) host platform
#[derive(Debug, Clone)]
pub struct Platform {
    pub os: OsFamily,
    /// OS release version, when it could be determined
    pub os_version: Option<Version>,
    /// CPU architecture (`x86_64`, `aarch64`, ...)
    pub arch: String,
    /// Names of environment variables that are set
    env_vars: BTreeSet<String>,
}

impl Platform {
    /// Construct a platform without probing the host
    pub fn new(os: OsFamily, os_version: Option<&str>) -> Self {
        Self {
            os,
            os_version: os_version.and_then(parse_dotted_version),
            arch: std::env::consts::ARCH.to_string(),
            env_vars: BTreeSet::new(),
        }
    }

    /// Mark an environment variable as set
    pub fn with_env(mut self, name: &str) -> Self {
        self.env_vars.insert(name.to_string());
        self
    }

    /// Detect the running host
    pub fn detect() -> Self {
        let os = OsFamily::current();
        let os_version = match os {
            OsFamily::Macos => macos_product_version(),
            _ => None,
        };
        debug!("Detected platform {} {:?}", os, os_version);

        Self {
            os,
            os_version,
            arch: std::env::consts::ARCH.to_string(),
            env_vars: std::env::vars_os()
                .filter_map(|(k, _)| k.into_string().ok())
                .collect(),
        }
    }

    /// Whether an environment variable is set
    pub fn has_env(&self, name: &str) -> bool {
        self.env_vars.contains(name)
    }

    /// Check a platform selector
    ///
    /// Version bounds are inclusive and compare OS *releases*: for macOS 11
    /// and later only the major number matters, so `max = "11"` matches 11.7.
    /// A bound cannot match a platform whose version is unknown.
    pub fn matches(&self, os: OsFamily, min: Option<&str>, max: Option<&str>) -> bool {
        if self.os != os {
            return false;
        }
        if min.is_none() && max.is_none() {
            return true;
        }
        let Some(current) = self.os_version.as_ref() else {
            return false;
        };
        let key = release_key(os, current);

        if let Some(min) = min.and_then(|m| resolve_version(os, m)) {
            if key < release_key(os, &min) {
                return false;
            }
        }
        if let Some(max) = max.and_then(|m| resolve_version(os, m)) {
            if key > release_key(os, &max) {
                return false;
            }
        }
        true
    }

    /// Platform identifier used in logs and plan output
    pub fn id(&self) -> String {
        match &self.os_version {
            Some(v) => format!("{}-{}-{}", self.os, v, self.arch),
            None => format!("{}-{}", self.os, self.arch),
        }
    }
}

/// Parse a dotted version ("11", "10.14", "0.23.8") into a semver version
pub fn parse_dotted_version(s: &str) -> Option<Version> {
    let mut parts = s.trim().split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Resolve a version bound that may be a macOS release name
pub fn resolve_version(os: OsFamily, s: &str) -> Option<Version> {
    if os == OsFamily::Macos {
        if let Some(v) = macos_release(s) {
            return parse_dotted_version(v);
        }
    }
    parse_dotted_version(s)
}

/// Version for a macOS release name
pub fn macos_release(name: &str) -> Option<&'static str> {
    Some(match name {
        "high_sierra" => "10.13",
        "mojave" => "10.14",
        "catalina" => "10.15",
        "big_sur" => "11",
        "monterey" => "12",
        "ventura" => "13",
        "sonoma" => "14",
        "sequoia" => "15",
        _ => return None,
    })
}

fn release_key(os: OsFamily, v: &Version) -> (u64, u64) {
    if os == OsFamily::Macos && v.major >= 11 {
        (v.major, 0)
    } else {
        (v.major, v.minor)
    }
}

fn macos_product_version() -> Option<Version> {
    let output = Command::new("sw_vers").arg("-productVersion").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_dotted_version(&String::from_utf8_lossy(&output.stdout))
}
