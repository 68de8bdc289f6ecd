// src/commands/mod.rs
//! Command handlers for the mpd-kitchen CLI

mod cook;
mod deps;
mod livecheck;
mod plan;
mod service;
mod verify;

pub use cook::{cmd_caveats, cmd_cook};
pub use deps::cmd_deps;
pub use livecheck::cmd_livecheck;
pub use plan::cmd_plan;
pub use service::cmd_service;
pub use verify::cmd_verify;

use anyhow::{Context, Result};
use mpd_kitchen::KitchenConfig;
use mpd_kitchen::recipe::{Recipe, bundled_recipe, parse_recipe_file};
use std::path::Path;

/// Load the recipe named on the command line, or the bundled MPD recipe
pub(crate) fn load_recipe(path: Option<&str>) -> Result<Recipe> {
    match path {
        Some(path) => {
            let path = Path::new(path);
            parse_recipe_file(path)
                .with_context(|| format!("Failed to parse recipe: {}", path.display()))
        }
        None => bundled_recipe().context("Bundled recipe is invalid"),
    }
}

/// Kitchen configuration with the prefix from the command line applied
pub(crate) fn kitchen_config(prefix: Option<&str>) -> KitchenConfig {
    match prefix {
        Some(prefix) => KitchenConfig::with_prefix(Path::new(prefix)),
        None => KitchenConfig::default(),
    }
}
