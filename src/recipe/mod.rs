// src/recipe/mod.rs

//! Recipe system for installing daemons from source
//!
//! Recipes define how to build and install a package from source, including:
//! - Source archives and their checksums
//! - Patches to apply
//! - Build and runtime dependencies, possibly platform-conditional
//! - A fixed meson feature matrix plus per-platform overrides
//! - Install layout, service descriptor and smoke test
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Cook**: Build and install a package from a recipe
//! - **Kitchen**: The installer pipeline
//! - **Prep**: Fetch and prepare sources
//! - **Simmer**: The actual build process
//! - **Keg**: The versioned directory a package is installed into
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "mpd"
//! version = "0.23.8"
//!
//! [source]
//! archive = "https://www.musicpd.org/download/mpd/0.23/mpd-%(version)s.tar.xz"
//! checksum = "sha256:abc123..."
//!
//! [[dependencies]]
//! name = "meson"
//! role = "build"
//! binary = "meson"
//!
//! [build]
//! system = "meson"
//! options = ["mad=disabled", "upnp=pupnp"]
//! ```

pub mod format;
pub mod kitchen;
pub mod parser;

pub use format::{
    BuildSection, Dependency, DependencyRole, FeatureFlag, FeatureValue, PatchInfo,
    PlatformOverride, Recipe, SourceSection, TestSection,
};
pub use kitchen::{Cook, CookResult, Kitchen, KitchenConfig};
pub use parser::{bundled_recipe, parse_recipe, parse_recipe_file, validate_recipe};
