// src/commands/service.rs

//! Service command - hand the service descriptor to a process supervisor

use anyhow::{Context, Result, anyhow};
use mpd_kitchen::service::{
    LaunchdSupervisor, ProcessSupervisor, SystemdSupervisor, native_supervisor,
};
use mpd_kitchen::{Kitchen, OsFamily, Platform};
use std::sync::Arc;

use super::{kitchen_config, load_recipe};

/// Supervisor for an explicit descriptor format, or the host's native one
pub(crate) fn supervisor_for(
    format: Option<&str>,
    os: OsFamily,
) -> Result<Arc<dyn ProcessSupervisor>> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;

    Ok(match format {
        Some("launchd") => Arc::new(LaunchdSupervisor::new(home.join("Library/LaunchAgents"))),
        Some("systemd") => Arc::new(SystemdSupervisor::new(home.join(".config/systemd/user"))),
        Some(other) => return Err(anyhow!("Unknown service format: {}", other)),
        None => Arc::from(native_supervisor(os, &home)?),
    })
}

pub fn cmd_service(
    recipe_path: Option<&str>,
    prefix: Option<&str>,
    print: bool,
    format: Option<&str>,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let platform = Platform::detect();
    let os = platform.os;
    let kitchen = Kitchen::new(kitchen_config(prefix), platform);

    if print {
        let descriptor = kitchen
            .service_descriptor(&recipe)
            .ok_or_else(|| anyhow!("{} declares no service", recipe.package.name))?;
        let use_launchd = match format {
            Some(f) => f == "launchd",
            None => os == OsFamily::Macos,
        };
        if use_launchd {
            print!("{}", descriptor.to_plist());
        } else {
            print!("{}", descriptor.to_systemd_unit());
        }
        return Ok(());
    }

    let kitchen = kitchen.with_supervisor(supervisor_for(format, os)?);
    let installed = kitchen
        .installed(&recipe)
        .with_context(|| format!("Cannot register the {} service", recipe.package.name))?;

    let registered = kitchen
        .register_service(&recipe, &installed)
        .with_context(|| format!("Failed to register the {} service", recipe.package.name))?
        .ok_or_else(|| anyhow!("{} declares no service", recipe.package.name))?;

    match &registered.path {
        Some(path) => println!(
            "[OK] Wrote {} for {}",
            path.display(),
            registered.descriptor.label
        ),
        None => println!("[OK] {} described, not registered", registered.descriptor.label),
    }

    Ok(())
}
