// src/recipe/kitchen/resolve.rs

//! Dependency resolution for recipe builds

use crate::error::{Error, Result};
use crate::platform::{OsFamily, Platform, parse_dotted_version};
use crate::recipe::format::{Dependency, DependencyRole, Recipe};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Trait for checking and installing dependencies before building
///
/// This keeps the Kitchen decoupled from whatever provides packages on the
/// host (a package manager, a pre-provisioned prefix, a CI image).
pub trait DependencyResolver: Send + Sync {
    /// Check which dependencies are missing
    ///
    /// Returns the names of dependencies that are not currently present.
    fn check_missing(&self, deps: &[&Dependency]) -> Result<Vec<String>>;

    /// Install the named dependencies
    ///
    /// Returns the names that were actually installed.
    fn install(&self, names: &[String]) -> Result<Vec<String>>;

    /// Host C/C++ compiler as `(family, major version)`, if known
    fn compiler(&self) -> Option<(String, String)> {
        None
    }
}

/// A resolver that assumes every dependency is satisfied
///
/// Use this when the build environment is provisioned out of band.
pub struct NoopResolver;

impl DependencyResolver for NoopResolver {
    fn check_missing(&self, _deps: &[&Dependency]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn install(&self, _names: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Probes the host: binaries on `PATH`, pkg-config modules, or an `opt`
/// link under the prefix. Cannot install anything.
pub struct HostResolver {
    opt_dir: PathBuf,
}

impl HostResolver {
    pub fn new(prefix: &Path) -> Self {
        Self {
            opt_dir: prefix.join("opt"),
        }
    }

    fn is_present(&self, dep: &Dependency) -> bool {
        if let Some(binary) = &dep.binary {
            return which::which(binary).is_ok();
        }
        if let Some(module) = &dep.pkg_config {
            return Command::new("pkg-config")
                .args(["--exists", module])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
        }
        self.opt_dir.join(&dep.name).exists()
    }
}

impl DependencyResolver for HostResolver {
    fn check_missing(&self, deps: &[&Dependency]) -> Result<Vec<String>> {
        Ok(deps
            .iter()
            .filter(|d| !self.is_present(d))
            .map(|d| d.name.clone())
            .collect())
    }

    fn install(&self, _names: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn compiler(&self) -> Option<(String, String)> {
        let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
        let output = Command::new(&cc).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        parse_compiler_version(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `cc --version` output into `(family, major)`
///
/// Distribution gcc builds installed as `cc` print `cc (Debian 12.2.0-14) 12.2.0`,
/// so the parenthesised form counts as gcc too. The release is the last
/// dotted number on the line; the ones inside the parentheses are package
/// versions.
pub fn parse_compiler_version(output: &str) -> Option<(String, String)> {
    let first = output.lines().next()?;
    let family = if first.contains("clang") {
        "clang"
    } else if first.contains("gcc")
        || first.contains("GCC")
        || first.starts_with("cc (")
        || first.starts_with("c++ (")
        || first.contains("Free Software")
    {
        "gcc"
    } else {
        return None;
    };

    let version = first
        .split_whitespace()
        .rfind(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit()) && w.contains('.'))?;
    let major = version.split('.').next()?.to_string();

    Some((family.to_string(), major))
}

/// Outcome of dependency resolution
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResolvedSet {
    /// Platform the set was resolved for
    pub platform: String,
    /// Build-time dependencies, already present or installed
    pub build: Vec<String>,
    /// Runtime dependencies, already present or installed
    pub runtime: Vec<String>,
    /// Dependencies the OS provides itself on this platform
    pub provided_by_host: Vec<String>,
    /// Dependencies installed by this resolution
    pub newly_installed: Vec<String>,
}

impl ResolvedSet {
    /// Every resolved dependency name
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.build
            .iter()
            .chain(self.runtime.iter())
            .chain(self.provided_by_host.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.build.len() + self.runtime.len() + self.provided_by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolve every dependency of `recipe` that applies to `platform`
///
/// Fails with [`Error::DependencyMissing`] when something is absent after
/// the resolver had a chance to install it, when the host is older than
/// the recipe's minimum macOS release, or when the host compiler is listed
/// under `fails_with`.
pub fn resolve_dependencies(
    recipe: &Recipe,
    platform: &Platform,
    resolver: &dyn DependencyResolver,
) -> Result<ResolvedSet> {
    check_requirements(recipe, platform, resolver)?;

    let applicable = recipe.dependencies_for(platform);
    let (host_provided, needed): (Vec<&Dependency>, Vec<&Dependency>) =
        applicable.into_iter().partition(|d| d.provided_by(platform));

    info!(
        "Resolving {} dependencies for {} ({} provided by host)",
        needed.len(),
        platform.id(),
        host_provided.len()
    );

    let missing = resolver.check_missing(&needed)?;
    let mut newly_installed = Vec::new();

    if !missing.is_empty() {
        info!("Installing missing dependencies: {}", missing.join(", "));
        newly_installed = resolver.install(&missing)?;

        let unresolved: Vec<String> = missing
            .iter()
            .filter(|m| !newly_installed.contains(m))
            .cloned()
            .collect();

        if !unresolved.is_empty() {
            warn!("Could not resolve dependencies: {}", unresolved.join(", "));
            return Err(Error::DependencyMissing(unresolved));
        }
    }

    let names = |role: DependencyRole| -> Vec<String> {
        needed
            .iter()
            .filter(|d| d.role == role)
            .map(|d| d.name.clone())
            .collect()
    };

    let set = ResolvedSet {
        platform: platform.id(),
        build: names(DependencyRole::Build),
        runtime: names(DependencyRole::Runtime),
        provided_by_host: host_provided.iter().map(|d| d.name.clone()).collect(),
        newly_installed,
    };

    debug!("Resolved set: {:?}", set);
    Ok(set)
}

fn check_requirements(
    recipe: &Recipe,
    platform: &Platform,
    resolver: &dyn DependencyResolver,
) -> Result<()> {
    if let Some(min) = &recipe.requirements.macos
        && platform.os == OsFamily::Macos
    {
        if platform.os_version.is_none() {
            warn!("macOS version unknown, not enforcing minimum {}", min);
        } else if !platform.matches(OsFamily::Macos, Some(min), None) {
            return Err(Error::DependencyMissing(vec![format!("macOS >= {}", min)]));
        }
    }

    if recipe.requirements.fails_with.is_empty() {
        return Ok(());
    }

    // A `fails_with` version excludes that release and everything older
    if let Some((family, major)) = resolver.compiler() {
        let host = parse_dotted_version(&major);
        let excluded = recipe.requirements.fails_with.iter().any(|x| {
            x.compiler == family
                && x.version.as_deref().is_none_or(|v| {
                    matches!((&host, parse_dotted_version(v)), (Some(h), Some(bad)) if *h <= bad)
                })
        });
        if excluded {
            return Err(Error::DependencyMissing(vec![format!(
                "a compiler other than {} {}",
                family, major
            )]));
        }
    }

    Ok(())
}
