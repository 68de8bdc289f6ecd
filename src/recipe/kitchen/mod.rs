// src/recipe/kitchen/mod.rs

//! Kitchen: the installer pipeline for cooking recipes
//!
//! The Kitchen takes a recipe from dependency resolution to a registered
//! service:
//! - Resolving dependencies for the host platform
//! - Planning the meson invocations for the host's platform strategy
//! - Fetching, verifying, extracting and patching sources
//! - Running setup, compile and install
//! - Installing the configuration template and linking `opt`
//! - Handing a service descriptor to a process supervisor

mod archive;
mod config;
mod cook;
pub mod install;
pub mod plan;
pub mod resolve;
pub mod runner;

pub use archive::{sha256_file, verify_file_checksum};
pub use config::{CookResult, KitchenConfig, RegisteredService};
pub use cook::Cook;
pub use install::{Artifacts, InstallLock, InstalledLayout, PrefixLayout};
pub use plan::{BuildPhase, BuildPlan, BuildStep, PlatformStrategy};
pub use resolve::{DependencyResolver, HostResolver, NoopResolver, ResolvedSet};
pub use runner::{BuildRunner, CommandRunner, StepOutput};

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::recipe::format::Recipe;
use crate::service::{ProcessSupervisor, ServiceDescriptor};
use archive::download_file;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    platform: Platform,
    resolver: Arc<dyn DependencyResolver>,
    runner: Arc<dyn BuildRunner>,
    /// Optional supervisor for service registration
    supervisor: Option<Arc<dyn ProcessSupervisor>>,
}

impl Kitchen {
    /// Create a Kitchen that trusts the host to provide dependencies and
    /// runs meson as a child process
    pub fn new(config: KitchenConfig, platform: Platform) -> Self {
        let runner = Arc::new(CommandRunner::new(config.timeout));
        Self {
            config,
            platform,
            resolver: Arc::new(NoopResolver),
            runner,
            supervisor: None,
        }
    }

    /// Create a Kitchen with default configuration for the detected host
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default(), Platform::detect())
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn BuildRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Install layout of a recipe under the configured prefix
    pub fn layout(&self, recipe: &Recipe) -> PrefixLayout {
        PrefixLayout::new(&self.config.prefix, recipe)
    }

    /// Resolve the recipe's dependencies for the host platform
    pub fn resolve_dependencies(&self, recipe: &Recipe) -> Result<ResolvedSet> {
        resolve::resolve_dependencies(recipe, &self.platform, self.resolver.as_ref())
    }

    /// Plan the build for the host platform
    pub fn plan(&self, recipe: &Recipe) -> Result<BuildPlan> {
        let strategy = PlatformStrategy::select(recipe, &self.platform);
        plan::configure(&recipe.build, &strategy, &self.layout(recipe), self.config.jobs)
    }

    /// Run a plan against a prepared source tree
    pub fn build(&self, plan: &BuildPlan, source_dir: &Path) -> Result<Artifacts> {
        let mut log = String::new();
        let (artifacts, _lock) = self.run_plan(plan, source_dir, &mut log)?;
        debug!("Build output:\n{}", log);
        Ok(artifacts)
    }

    /// Run setup, compile and install in order, appending output to `log`
    ///
    /// Stops at the first failing step; its captured output is carried in
    /// the [`Error::BuildFailure`]. The install lock is taken before the
    /// install step and handed back so the caller can finish the prefix
    /// under the same lock.
    pub(crate) fn run_plan(
        &self,
        plan: &BuildPlan,
        source_dir: &Path,
        log: &mut String,
    ) -> Result<(Artifacts, InstallLock)> {
        let mut lock = None;
        for step in &plan.steps {
            if step.phase == BuildPhase::Install && lock.is_none() {
                lock = Some(InstallLock::acquire(&plan.lock_path)?);
            }
            let output = self.runner.run(step, source_dir, &plan.env)?;

            log.push_str(&format!("$ {}\n", step.command_line()));
            log.push_str(&output.stdout);
            log.push_str(&output.stderr);

            if !output.success {
                return Err(Error::BuildFailure {
                    phase: step.phase.to_string(),
                    output: output.combined(),
                });
            }
        }

        let lock = match lock {
            Some(lock) => lock,
            None => InstallLock::acquire(&plan.lock_path)?,
        };

        let artifacts = Artifacts {
            keg: plan.keg.clone(),
            source_dir: source_dir.to_path_buf(),
        };
        Ok((artifacts, lock))
    }

    /// Install built artifacts into the prefix
    pub fn install(&self, recipe: &Recipe, artifacts: &Artifacts) -> Result<InstalledLayout> {
        install::install_artifacts(recipe, &self.layout(recipe), artifacts)
    }

    /// The recipe's current install under the prefix
    pub fn installed(&self, recipe: &Recipe) -> Result<InstalledLayout> {
        install::find_installed(recipe, &self.layout(recipe))
    }

    /// Build the service descriptor for an installed recipe
    ///
    /// Returns `None` when the recipe declares no service.
    pub fn service_descriptor(&self, recipe: &Recipe) -> Option<ServiceDescriptor> {
        let service = recipe.service.as_ref()?;
        let layout = self.layout(recipe);
        let vars = layout.substitutions();
        let vars: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();

        Some(ServiceDescriptor {
            label: ServiceDescriptor::label_for(&recipe.package.name),
            program_args: service
                .run
                .iter()
                .map(|arg| recipe.substitute(arg, &vars))
                .collect(),
            keep_alive: service.keep_alive,
            process_type: service.process_type,
            working_dir: service
                .working_dir
                .as_ref()
                .map(|d| PathBuf::from(recipe.substitute(d, &vars))),
        })
    }

    /// Hand the recipe's service descriptor to the configured supervisor
    ///
    /// Nothing is started. Refuses to register a service whose program has
    /// not been installed.
    pub fn register_service(
        &self,
        recipe: &Recipe,
        installed: &InstalledLayout,
    ) -> Result<Option<RegisteredService>> {
        let Some(descriptor) = self.service_descriptor(recipe) else {
            debug!("{} declares no service", recipe.package.name);
            return Ok(None);
        };

        if let Some(missing) = installed.binaries.iter().find(|b| !b.is_file()) {
            return Err(Error::ServiceError(format!(
                "{} is not installed",
                missing.display()
            )));
        }

        let path = match &self.supervisor {
            Some(supervisor) => {
                info!("Registering {} with {}", descriptor.label, supervisor.name());
                Some(supervisor.register(&descriptor)?)
            }
            None => {
                warn!("No process supervisor configured; {} not registered", descriptor.label);
                None
            }
        };

        Ok(Some(RegisteredService { descriptor, path }))
    }

    /// Operator notes with prefix variables substituted
    pub fn caveats(&self, recipe: &Recipe) -> Option<String> {
        let caveats = recipe.caveats.as_ref()?;
        let vars = self.layout(recipe).substitutions();
        let vars: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Some(recipe.substitute(caveats.trim_end(), &vars))
    }

    /// Cook a recipe from its upstream source archive
    ///
    /// ## Full Cooking Process
    /// 1. **Resolve**: dependencies and host requirements
    /// 2. **Plan**: meson arguments and environment for this host
    /// 3. **Prep**: fetch and verify the source archive
    /// 4. **Unpack**: extract sources and apply patches
    /// 5. **Simmer**: setup, compile, install
    /// 6. **Plate**: install config, link `opt`, register the service
    pub fn cook(&self, recipe: &Recipe) -> Result<CookResult> {
        info!(
            "Cooking {} version {}",
            recipe.package.name,
            recipe.full_version()
        );

        let mut cook = Cook::new(self, recipe)?;
        let resolved = self.resolve_dependencies(recipe)?;
        let plan = self.plan(recipe)?;

        info!("Prep: fetching ingredients...");
        cook.prep()?;

        info!("Unpacking and patching sources...");
        cook.unpack()?;
        cook.patch()?;

        self.finish_cook(cook, resolved, plan)
    }

    /// Cook a recipe from an already unpacked and patched source tree
    pub fn cook_from_source(&self, recipe: &Recipe, source_dir: &Path) -> Result<CookResult> {
        info!(
            "Cooking {} version {} from {}",
            recipe.package.name,
            recipe.full_version(),
            source_dir.display()
        );

        if !source_dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Source directory not found: {}",
                source_dir.display()
            )));
        }

        let cook = Cook::with_source(self, recipe, source_dir)?;
        let resolved = self.resolve_dependencies(recipe)?;
        let plan = self.plan(recipe)?;

        self.finish_cook(cook, resolved, plan)
    }

    fn finish_cook(
        &self,
        mut cook: Cook<'_>,
        resolved: ResolvedSet,
        plan: BuildPlan,
    ) -> Result<CookResult> {
        let recipe = cook.recipe;

        info!("Simmering: running build...");
        let (artifacts, lock) = cook.simmer(&plan)?;

        info!("Plating: installing into {}", self.config.prefix.display());
        let installed =
            install::install_artifacts_locked(recipe, &self.layout(recipe), &artifacts, &lock)?;
        drop(lock);

        let service = self.register_service(recipe, &installed)?;

        let (log, warnings) = cook.finish();

        Ok(CookResult {
            resolved,
            plan,
            installed,
            service,
            log,
            warnings,
            caveats: self.caveats(recipe),
        })
    }

    /// Fetch and verify the source archive without building
    ///
    /// Returns the path of the cached archive.
    pub fn fetch(&self, recipe: &Recipe) -> Result<PathBuf> {
        let archive_url = recipe.archive_url();
        info!("Fetching: {}", archive_url);
        self.fetch_source(&archive_url, &recipe.source.checksum)
    }

    /// Check if the source archive is already cached
    pub fn sources_cached(&self, recipe: &Recipe) -> bool {
        self.cache_path(&recipe.source.checksum).exists()
    }

    fn cache_path(&self, checksum: &str) -> PathBuf {
        self.config.source_cache.join(checksum.replace(':', "_"))
    }

    /// Fetch a source archive (with caching)
    pub(crate) fn fetch_source(&self, url: &str, checksum: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.source_cache)?;

        // Checksum is the cache key
        let cached_path = self.cache_path(checksum);

        if cached_path.exists() {
            debug!("Using cached source: {}", cached_path.display());
            if verify_file_checksum(&cached_path, checksum)? {
                return Ok(cached_path);
            }
            warn!("Cached file checksum mismatch, re-downloading");
            fs::remove_file(&cached_path)?;
        }

        info!("Downloading: {}", url);
        let temp_path = cached_path.with_extension("tmp");

        download_file(url, &temp_path)?;

        if !verify_file_checksum(&temp_path, checksum)? {
            let actual = sha256_file(&temp_path)?;
            fs::remove_file(&temp_path)?;
            return Err(Error::ChecksumMismatch {
                expected: checksum.to_string(),
                actual: format!("sha256:{}", actual),
            });
        }

        fs::rename(&temp_path, &cached_path)?;
        Ok(cached_path)
    }
}
