// src/recipe/kitchen/install.rs

//! Install layout under a prefix
//!
//! A package is installed into a versioned keg (`Cellar/<name>/<version>`),
//! exposed through an unversioned `opt/<name>` link, and its configuration
//! template is copied to `etc/<name>/`. All writes happen under an exclusive
//! lock on `var/mpd-kitchen/install.lock`.

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths a recipe installs into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixLayout {
    pub prefix: PathBuf,
    /// Versioned install prefix handed to the build system
    pub keg: PathBuf,
    pub bin: PathBuf,
    /// Stable link to the current keg
    pub opt: PathBuf,
    pub opt_bin: PathBuf,
    /// Shared sysconfdir
    pub etc: PathBuf,
    /// Package configuration directory
    pub pkgetc: PathBuf,
    pub lock_path: PathBuf,
}

impl PrefixLayout {
    pub fn new(prefix: &Path, recipe: &Recipe) -> Self {
        let name = &recipe.package.name;
        let keg = prefix.join("Cellar").join(name).join(recipe.full_version());
        let opt = prefix.join("opt").join(name);
        let etc = prefix.join("etc");

        Self {
            prefix: prefix.to_path_buf(),
            bin: keg.join("bin"),
            keg,
            opt_bin: opt.join("bin"),
            opt,
            pkgetc: etc.join(name),
            etc,
            lock_path: prefix.join("var/mpd-kitchen/install.lock"),
        }
    }

    /// Variables available to recipe templates
    pub fn substitutions(&self) -> Vec<(&'static str, String)> {
        vec![
            ("prefix", self.prefix.display().to_string()),
            ("keg", self.keg.display().to_string()),
            ("bin", self.bin.display().to_string()),
            ("opt_bin", self.opt_bin.display().to_string()),
            ("etc", self.etc.display().to_string()),
        ]
    }
}

/// Exclusive lock held for the duration of an install
///
/// Released when dropped.
pub struct InstallLock {
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Acquire the lock, blocking until available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        file.lock_exclusive()
            .map_err(|e| Error::IoError(format!("Failed to acquire install lock: {}", e)))?;

        debug!("Acquired install lock at {}", path.display());
        Ok(Self { file, path })
    }

    /// Try to acquire the lock without blocking
    ///
    /// `Ok(None)` means another installer holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Install lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!("Failed to try install lock: {}", e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        debug!("Released install lock at {}", self.path.display());
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

/// What a successful build leaves behind
#[derive(Debug, Clone)]
pub struct Artifacts {
    /// Keg the build system installed into
    pub keg: PathBuf,
    /// Unpacked and patched source tree
    pub source_dir: PathBuf,
}

/// Result of installing a keg
#[derive(Debug, Clone, Serialize)]
pub struct InstalledLayout {
    pub keg: PathBuf,
    /// Declared binaries, inside the keg
    pub binaries: Vec<PathBuf>,
    pub opt: PathBuf,
    pub opt_bin: PathBuf,
    /// Template the config was copied from
    pub config_template: Option<PathBuf>,
    /// Installed configuration file
    pub config_path: Option<PathBuf>,
}

impl InstalledLayout {
    /// Path of a declared binary
    pub fn binary(&self, name: &str) -> Option<&Path> {
        self.binaries
            .iter()
            .find(|b| b.file_name().is_some_and(|f| f == name))
            .map(PathBuf::as_path)
    }
}

/// Finish an install: check binaries, copy the config template, link `opt`
///
/// Safe to repeat; every file is replaced atomically.
pub fn install_artifacts(
    recipe: &Recipe,
    layout: &PrefixLayout,
    artifacts: &Artifacts,
) -> Result<InstalledLayout> {
    let lock = InstallLock::acquire(&layout.lock_path)?;
    install_artifacts_locked(recipe, layout, artifacts, &lock)
}

/// Same as [`install_artifacts`], under a lock the caller already holds
///
/// Lets the build system's install step and the prefix updates share one
/// critical section.
pub fn install_artifacts_locked(
    recipe: &Recipe,
    layout: &PrefixLayout,
    artifacts: &Artifacts,
    lock: &InstallLock,
) -> Result<InstalledLayout> {
    if lock.path() != layout.lock_path {
        return Err(Error::InstallFailure(format!(
            "install lock {} does not guard {}",
            lock.path().display(),
            layout.prefix.display()
        )));
    }
    info!("Installing {} into {}", recipe.package.name, artifacts.keg.display());

    let bin = artifacts.keg.join("bin");
    let mut binaries = Vec::new();
    for name in &recipe.install.binaries {
        let path = bin.join(name);
        if !path.is_file() {
            return Err(Error::InstallFailure(format!(
                "expected binary {} was not installed",
                path.display()
            )));
        }
        binaries.push(path);
    }

    let (config_template, config_path) =
        match (&recipe.install.config_template, &recipe.install.config_name) {
            (Some(template), Some(name)) => {
                let src = artifacts.source_dir.join(template);
                let dest = layout.pkgetc.join(name);
                copy_replacing(&src, &dest)?;
                info!("Installed {} as {}", src.display(), dest.display());
                (Some(src), Some(dest))
            }
            _ => (None, None),
        };

    link_opt(&artifacts.keg, &layout.opt)?;

    Ok(InstalledLayout {
        keg: artifacts.keg.clone(),
        binaries,
        opt: layout.opt.clone(),
        opt_bin: layout.opt_bin.clone(),
        config_template,
        config_path,
    })
}

/// Inspect an existing install without modifying it
pub fn find_installed(recipe: &Recipe, layout: &PrefixLayout) -> Result<InstalledLayout> {
    let binaries: Vec<PathBuf> = recipe
        .install
        .binaries
        .iter()
        .map(|name| layout.bin.join(name))
        .collect();

    if let Some(missing) = binaries.iter().find(|b| !b.is_file()) {
        return Err(Error::NotFound(format!(
            "{} {} is not installed ({} missing)",
            recipe.package.name,
            recipe.full_version(),
            missing.display()
        )));
    }

    let config_path = recipe
        .install
        .config_name
        .as_ref()
        .map(|name| layout.pkgetc.join(name))
        .filter(|p| p.is_file());

    Ok(InstalledLayout {
        keg: layout.keg.clone(),
        binaries,
        opt: layout.opt.clone(),
        opt_bin: layout.opt_bin.clone(),
        config_template: None,
        config_path,
    })
}

/// Copy via a sibling temp file and rename over the destination
fn copy_replacing(src: &Path, dest: &Path) -> Result<()> {
    let content = fs::read(src).map_err(|e| {
        Error::InstallFailure(format!("cannot read config template {}: {}", src.display(), e))
    })?;

    let dir = dest
        .parent()
        .ok_or_else(|| Error::InstallFailure(format!("invalid destination {}", dest.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .map_err(|e| Error::InstallFailure(format!("cannot replace {}: {}", dest.display(), e)))?;
    Ok(())
}

#[cfg(unix)]
fn link_opt(keg: &Path, opt: &Path) -> Result<()> {
    let dir = opt
        .parent()
        .ok_or_else(|| Error::InstallFailure(format!("invalid opt path {}", opt.display())))?;
    fs::create_dir_all(dir)?;

    // Point a fresh link at the keg, then rename it over the old one
    let staging = dir.join(format!(
        ".{}.tmp",
        opt.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    if fs::symlink_metadata(&staging).is_ok() {
        fs::remove_file(&staging)?;
    }
    std::os::unix::fs::symlink(keg, &staging)?;
    fs::rename(&staging, opt)
        .map_err(|e| Error::InstallFailure(format!("cannot link {}: {}", opt.display(), e)))?;

    debug!("Linked {} -> {}", opt.display(), keg.display());
    Ok(())
}

#[cfg(not(unix))]
fn link_opt(_keg: &Path, _opt: &Path) -> Result<()> {
    Err(Error::InstallFailure(
        "opt links are only supported on unix hosts".to_string(),
    ))
}
