// src/commands/verify.rs

//! Verify command - smoke test the installed daemon

use anyhow::{Context, Result, bail};
use mpd_kitchen::recipe::kitchen::InstalledLayout;
use mpd_kitchen::{Kitchen, Platform, Recipe, Verifier, VerifyReport};
use std::time::Duration;

use super::{kitchen_config, load_recipe};

/// Run the recipe's smoke test against an install
pub(crate) fn run_smoke_test(
    kitchen: &Kitchen,
    recipe: &Recipe,
    installed: &InstalledLayout,
    timeout: Option<u64>,
) -> Result<VerifyReport> {
    let mut verifier = Verifier::new(kitchen.platform().clone());
    if let Some(t) = timeout
        .map(Duration::from_secs)
        .or(kitchen.config().banner_timeout)
    {
        verifier = verifier.with_banner_timeout(t);
    }

    verifier
        .verify(recipe, &installed.keg.join("bin"))
        .with_context(|| format!("Smoke test of {} failed", recipe.package.name))
}

pub(crate) fn print_report(report: &VerifyReport) {
    if let Some(reason) = &report.skip_reason {
        println!("[SKIPPED] Smoke test skipped: {}", reason);
        return;
    }

    if let Some(port) = report.port {
        println!("Smoke test on 127.0.0.1:{}", port);
    }
    if let Some(banner) = &report.banner {
        println!("  banner:   {}", banner);
    }
    if let Some(greeting) = &report.greeting {
        println!("  greeting: {}", greeting);
    }
    if let Some(response) = &report.response {
        println!("  response: {}", response);
    }
    println!("[OK] Smoke test passed");
}

pub fn cmd_verify(
    recipe_path: Option<&str>,
    prefix: Option<&str>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let kitchen = Kitchen::new(kitchen_config(prefix), Platform::detect());

    let installed = kitchen
        .installed(&recipe)
        .with_context(|| format!("Nothing to verify for {}", recipe.package.name))?;

    let report = run_smoke_test(&kitchen, &recipe, &installed, timeout)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.passed() && !report.skipped() {
        bail!("Smoke test ended in state {}", report.state());
    }
    Ok(())
}
