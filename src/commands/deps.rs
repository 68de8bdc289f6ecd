// src/commands/deps.rs

//! Deps command - resolve a recipe's dependencies on this host

use anyhow::{Context, Result};
use mpd_kitchen::recipe::kitchen::{DependencyResolver, HostResolver, NoopResolver};
use mpd_kitchen::{Kitchen, Platform};
use std::sync::Arc;

use super::{kitchen_config, load_recipe};

pub fn cmd_deps(
    recipe_path: Option<&str>,
    prefix: Option<&str>,
    assume_present: bool,
    json: bool,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let config = kitchen_config(prefix);

    let resolver: Arc<dyn DependencyResolver> = if assume_present {
        Arc::new(NoopResolver)
    } else {
        Arc::new(HostResolver::new(&config.prefix))
    };
    let kitchen = Kitchen::new(config, Platform::detect()).with_resolver(resolver);

    let set = kitchen
        .resolve_dependencies(&recipe)
        .with_context(|| format!("Failed to resolve dependencies for {}", recipe.package.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    println!(
        "Dependencies of {} {} on {}:",
        recipe.package.name, recipe.package.version, set.platform
    );
    println!("  Build ({}):", set.build.len());
    for name in &set.build {
        println!("    {}", name);
    }
    println!("  Runtime ({}):", set.runtime.len());
    for name in &set.runtime {
        println!("    {}", name);
    }
    if !set.provided_by_host.is_empty() {
        println!("  Provided by the OS: {}", set.provided_by_host.join(", "));
    }
    if !set.newly_installed.is_empty() {
        println!("  Installed now: {}", set.newly_installed.join(", "));
    }
    println!("[OK] {} dependencies resolved", set.len());

    Ok(())
}
