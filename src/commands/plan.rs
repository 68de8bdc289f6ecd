// src/commands/plan.rs

//! Plan command - show the meson invocations for a platform

use anyhow::{Context, Result};
use mpd_kitchen::platform::{OsFamily, Platform, macos_release};
use mpd_kitchen::Kitchen;

use super::{kitchen_config, load_recipe};

pub fn cmd_plan(
    recipe_path: Option<&str>,
    prefix: Option<&str>,
    os: Option<&str>,
    os_version: Option<&str>,
    jobs: Option<u32>,
    json: bool,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;

    let mut config = kitchen_config(prefix);
    if let Some(j) = jobs {
        config.jobs = j;
    }

    let platform = match os {
        Some(os) => target_platform(os, os_version),
        None => Platform::detect(),
    };
    let kitchen = Kitchen::new(config, platform);

    let plan = kitchen
        .plan(&recipe)
        .with_context(|| format!("Failed to plan {}", recipe.package.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Build plan for {} on {}", recipe.package.name, plan.platform);
    println!("  Keg: {}", plan.keg.display());
    if !plan.env.is_empty() {
        println!("  Environment:");
        for (key, value) in &plan.env {
            println!("    {}={}", key, value);
        }
    }
    for step in &plan.steps {
        let mode = if step.is_parallel() {
            format!("{} jobs", step.jobs)
        } else {
            "serial".to_string()
        };
        println!("  [{}] ({}) {}", step.phase, mode, step.command_line());
    }

    Ok(())
}

fn target_platform(os: &str, version: Option<&str>) -> Platform {
    let family = match os {
        "macos" => OsFamily::Macos,
        "linux" => OsFamily::Linux,
        _ => OsFamily::Other,
    };
    let version = version.map(|v| macos_release(v).unwrap_or(v));
    Platform::new(family, version)
}
