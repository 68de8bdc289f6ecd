// src/recipe/kitchen/cook.rs

//! Cook: the build execution for a single recipe

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::parser::{bundled_patch, validate_recipe};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use super::Kitchen;
use super::archive::{apply_patch, extract_archive};
use super::install::{Artifacts, InstallLock};
use super::plan::BuildPlan;

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) recipe: &'a Recipe,
    /// Temporary build directory
    pub(super) build_dir: TempDir,
    /// Source directory within build_dir
    pub(super) source_dir: PathBuf,
    /// Build log accumulator
    pub(super) log: String,
    /// Warnings
    pub(super) warnings: Vec<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(kitchen: &'a Kitchen, recipe: &'a Recipe) -> Result<Self> {
        let warnings = validate_recipe(recipe)?;
        for warning in &warnings {
            debug!("Recipe warning: {}", warning);
        }

        let build_dir = tempfile::Builder::new()
            .prefix(&format!("mpd-kitchen-{}-", recipe.package.name))
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create build directory: {}", e)))?;

        let source_dir = build_dir.path().join("source");
        fs::create_dir_all(&source_dir)?;

        Ok(Self {
            kitchen,
            recipe,
            build_dir,
            source_dir,
            log: String::new(),
            warnings,
        })
    }

    /// Cook an already unpacked source tree instead of a fetched archive
    pub(super) fn with_source(kitchen: &'a Kitchen, recipe: &'a Recipe, source_dir: &Path) -> Result<Self> {
        let mut cook = Self::new(kitchen, recipe)?;
        cook.source_dir = source_dir.to_path_buf();
        Ok(cook)
    }

    /// Phase 1: Prep - fetch the source archive into the build directory
    pub(super) fn prep(&mut self) -> Result<()> {
        let archive_path = self.kitchen.fetch(self.recipe)?;

        let local_archive = self.build_dir.path().join(self.recipe.archive_filename());
        fs::copy(&archive_path, &local_archive)?;

        self.log_line(&format!("Fetched source: {}", self.recipe.archive_url()));
        Ok(())
    }

    /// Phase 2a: Unpack sources
    pub(super) fn unpack(&mut self) -> Result<()> {
        let archive_path = self.build_dir.path().join(self.recipe.archive_filename());

        extract_archive(&archive_path, &self.source_dir)?;
        self.log_line(&format!("Extracted source to {}", self.source_dir.display()));

        // Archives usually carry a single top-level directory
        let entries: Vec<_> = fs::read_dir(&self.source_dir)?
            .filter_map(|e| e.ok())
            .collect();

        if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
            self.source_dir = entries[0].path();
            debug!("Source directory: {}", self.source_dir.display());
        }

        if let Some(extract_dir) = &self.recipe.source.extract_dir {
            self.source_dir = self.build_dir.path().join("source").join(extract_dir);
        }

        Ok(())
    }

    /// Phase 2b: Apply patches
    ///
    /// Patch paths resolve against the recipe's directory; recipes without
    /// one (the bundled recipe) use the patches compiled into the binary.
    pub(super) fn patch(&mut self) -> Result<()> {
        let patches = match &self.recipe.patches {
            Some(p) => &p.files,
            None => return Ok(()),
        };

        for patch_info in patches {
            let patch_path = self.locate_patch(&patch_info.file)?;

            info!("Applying patch: {}", patch_info.file);
            apply_patch(&self.source_dir, &patch_path, patch_info.strip)?;
            self.log_line(&format!("Applied patch: {}", patch_info.file));
        }

        Ok(())
    }

    fn locate_patch(&self, file: &str) -> Result<PathBuf> {
        if let Some(base) = &self.recipe.base_dir {
            let path = base.join(file);
            if path.exists() {
                return Ok(path);
            }
            return Err(Error::NotFound(format!("Patch file not found: {}", path.display())));
        }

        let content = bundled_patch(file)
            .ok_or_else(|| Error::NotFound(format!("Patch file not found: {}", file)))?;
        let name = Path::new(file)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "patch.diff".into());
        let path = self.build_dir.path().join("patches").join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Phase 3: Simmer - run every step of the plan in order
    pub(super) fn simmer(&mut self, plan: &BuildPlan) -> Result<(Artifacts, InstallLock)> {
        self.kitchen.run_plan(plan, &self.source_dir, &mut self.log)
    }

    pub(super) fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    /// Persist the build directory when the kitchen is configured to keep it
    pub(super) fn finish(self) -> (String, Vec<String>) {
        if self.kitchen.config.keep_builddir {
            let kept = self.build_dir.keep();
            info!("Keeping build directory {}", kept.display());
        }
        (self.log, self.warnings)
    }
}
