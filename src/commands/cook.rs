// src/commands/cook.rs

//! Cook command - build and install a recipe

use anyhow::{Context, Result};
use mpd_kitchen::recipe::kitchen::{DependencyResolver, HostResolver, NoopResolver};
use mpd_kitchen::recipe::validate_recipe;
use mpd_kitchen::{Kitchen, Platform};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::service::supervisor_for;
use super::verify::{print_report, run_smoke_test};
use super::{kitchen_config, load_recipe};

/// Cook a package from a recipe
///
/// # Arguments
/// * `recipe_path` - Path to the recipe file (None = bundled recipe)
/// * `prefix` - Install prefix (None = per-user default)
/// * `source_cache` - Directory for caching downloaded sources
/// * `source_dir` - Prepared source tree to build instead of fetching
/// * `jobs` - Number of parallel build jobs (None = auto)
/// * `keep_builddir` - Keep build directory after completion
/// * `validate_only` - Only validate the recipe, don't cook
/// * `fetch_only` - Only fetch sources, don't build
/// * `assume_deps` - Skip probing the host for dependencies
/// * `no_service` - Don't write a service descriptor
/// * `verify` - Smoke test after installing
#[allow(clippy::too_many_arguments)]
pub fn cmd_cook(
    recipe_path: Option<&str>,
    prefix: Option<&str>,
    source_cache: Option<&str>,
    source_dir: Option<&str>,
    jobs: Option<u32>,
    keep_builddir: bool,
    validate_only: bool,
    fetch_only: bool,
    assume_deps: bool,
    no_service: bool,
    verify: bool,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    println!("Recipe: {} version {}", recipe.package.name, recipe.full_version());

    let warnings = validate_recipe(&recipe).context("Recipe validation failed")?;
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    if validate_only {
        println!("Recipe validation passed");
        if warnings.is_empty() {
            println!("[OK] No issues found");
        } else {
            println!("[OK] {} warning(s)", warnings.len());
        }
        return Ok(());
    }

    let mut config = kitchen_config(prefix);
    config.keep_builddir = keep_builddir;
    if let Some(cache) = source_cache {
        config.source_cache = PathBuf::from(cache);
    }
    if let Some(j) = jobs {
        config.jobs = j;
    }

    let platform = Platform::detect();
    let os = platform.os;
    let resolver: Arc<dyn DependencyResolver> = if assume_deps {
        Arc::new(NoopResolver)
    } else {
        Arc::new(HostResolver::new(&config.prefix))
    };

    let mut kitchen = Kitchen::new(config.clone(), platform).with_resolver(resolver);
    if !no_service {
        kitchen = kitchen.with_supervisor(supervisor_for(None, os)?);
    }

    if fetch_only {
        println!("Fetching sources (fetch-only mode)...");
        let archive = kitchen
            .fetch(&recipe)
            .with_context(|| format!("Failed to fetch sources for {}", recipe.package.name))?;
        println!("\n[COMPLETE] Fetched {}", archive.display());
        return Ok(());
    }

    println!(
        "Cooking with {} parallel jobs into {}...",
        config.jobs,
        config.prefix.display()
    );
    if source_dir.is_none() && kitchen.sources_cached(&recipe) {
        println!("  - Sources already cached");
    }

    let result = match source_dir {
        Some(dir) => kitchen.cook_from_source(&recipe, Path::new(dir)),
        None => kitchen.cook(&recipe),
    }
    .with_context(|| format!("Failed to cook {}", recipe.package.name))?;

    println!("\n[COMPLETE] Installed: {}", result.installed.keg.display());
    if let Some(config_path) = &result.installed.config_path {
        println!("  Config: {}", config_path.display());
    }
    if let Some(service) = &result.service {
        match &service.path {
            Some(path) => println!("  Service: {}", path.display()),
            None => println!("  Service: {} (not registered)", service.descriptor.label),
        }
    }

    if let Some(caveats) = &result.caveats {
        println!("\n==> Caveats\n{}", caveats);
    }

    info!(
        "Successfully cooked {} into {}",
        recipe.package.name,
        result.installed.keg.display()
    );

    if verify {
        println!();
        let report = run_smoke_test(&kitchen, &recipe, &result.installed, None)?;
        print_report(&report);
    }

    Ok(())
}

/// Show a recipe's post-install notes
pub fn cmd_caveats(recipe_path: Option<&str>, prefix: Option<&str>) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let kitchen = Kitchen::new(kitchen_config(prefix), Platform::detect());

    match kitchen.caveats(&recipe) {
        Some(caveats) => println!("{}", caveats),
        None => println!("{} has no caveats", recipe.package.name),
    }
    Ok(())
}
