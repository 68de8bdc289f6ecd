// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use crate::service::ServiceDescriptor;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::install::InstalledLayout;
use super::plan::BuildPlan;
use super::resolve::ResolvedSet;

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Install prefix (`Cellar/`, `opt/`, `etc/` live under it)
    pub prefix: PathBuf,
    /// Directory for downloaded sources
    pub source_cache: PathBuf,
    /// Timeout for each build step
    pub timeout: Duration,
    /// Number of parallel jobs
    pub jobs: u32,
    /// Keep build directory after completion (for debugging)
    pub keep_builddir: bool,
    /// Overrides the recipe's banner timeout for the smoke test
    pub banner_timeout: Option<Duration>,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        let data = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        let cache = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);

        Self {
            prefix: data.join("mpd-kitchen"),
            source_cache: cache.join("mpd-kitchen/sources"),
            timeout: Duration::from_secs(3600), // 1 hour
            jobs,
            keep_builddir: false,
            banner_timeout: None,
        }
    }
}

impl KitchenConfig {
    /// Default configuration rooted at `prefix`
    pub fn with_prefix(prefix: &Path) -> Self {
        Self {
            prefix: prefix.to_path_buf(),
            ..Self::default()
        }
    }
}

/// A descriptor handed to a supervisor
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredService {
    pub descriptor: ServiceDescriptor,
    /// File the supervisor wrote, if a supervisor was configured
    pub path: Option<PathBuf>,
}

/// Result of cooking a recipe
#[derive(Debug, Serialize)]
pub struct CookResult {
    pub resolved: ResolvedSet,
    pub plan: BuildPlan,
    pub installed: InstalledLayout,
    pub service: Option<RegisteredService>,
    /// Build log
    pub log: String,
    /// Warnings generated during build
    pub warnings: Vec<String>,
    /// Post-install notes for the operator
    pub caveats: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert!(config.jobs > 0);
        assert!(!config.keep_builddir);
        assert!(config.banner_timeout.is_none());
        assert!(config.prefix.ends_with("mpd-kitchen"));
    }

    #[test]
    fn test_kitchen_config_with_prefix() {
        let config = KitchenConfig::with_prefix(Path::new("/opt/homebrew"));
        assert_eq!(config.prefix, PathBuf::from("/opt/homebrew"));
        assert!(config.source_cache.ends_with("mpd-kitchen/sources"));
    }
}
