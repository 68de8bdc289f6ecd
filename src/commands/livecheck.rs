// src/commands/livecheck.rs

//! Livecheck command - compare the recipe against upstream releases

use anyhow::{Context, Result};
use mpd_kitchen::livecheck;

use super::load_recipe;

pub fn cmd_livecheck(recipe_path: Option<&str>, json: bool) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;

    let result = livecheck::check(&recipe)
        .with_context(|| format!("Livecheck failed for {}", recipe.package.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.outdated {
        println!(
            "{}: {} ==> {} (update available)",
            result.package, result.current, result.latest
        );
    } else {
        println!("{}: {} is up to date", result.package, result.current);
    }

    Ok(())
}
