// src/livecheck.rs

//! Upstream version discovery
//!
//! Fetches the page named by a recipe's `[livecheck]` section and scans it
//! with the recipe's regex; the first capture group of each match is a
//! candidate version.

use crate::error::{Error, Result};
use crate::platform::parse_dotted_version;
use crate::recipe::format::{LivecheckSection, Recipe};
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a livecheck
#[derive(Debug, Clone, Serialize)]
pub struct LivecheckResult {
    pub package: String,
    /// Version in the recipe
    pub current: String,
    /// Newest version found upstream
    pub latest: String,
    pub outdated: bool,
}

/// Every version the regex finds in `page`, newest first, without duplicates
pub fn extract_versions(page: &str, pattern: &str) -> Result<Vec<String>> {
    let re = Regex::new(pattern)
        .map_err(|e| Error::ParseError(format!("Invalid livecheck regex: {}", e)))?;

    if re.captures_len() < 2 {
        return Err(Error::ParseError(
            "Livecheck regex needs a capture group for the version".to_string(),
        ));
    }

    let mut versions: Vec<(Version, String)> = re
        .captures_iter(page)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_dotted_version(m.as_str()).map(|v| (v, m.as_str().to_string())))
        .collect();

    versions.sort_by(|a, b| b.0.cmp(&a.0));
    versions.dedup_by(|a, b| a.0 == b.0);

    Ok(versions.into_iter().map(|(_, s)| s).collect())
}

/// Compare the recipe's version against a page already fetched
pub fn check_page(recipe: &Recipe, livecheck: &LivecheckSection, page: &str) -> Result<LivecheckResult> {
    let versions = extract_versions(page, &livecheck.regex)?;
    debug!("Upstream versions: {:?}", versions);

    let latest = versions
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("No versions found at {}", livecheck.url)))?;

    let current = recipe.package.version.clone();
    let outdated = match (parse_dotted_version(&latest), parse_dotted_version(&current)) {
        (Some(l), Some(c)) => l > c,
        _ => latest != current,
    };

    Ok(LivecheckResult {
        package: recipe.package.name.clone(),
        current,
        latest,
        outdated,
    })
}

/// Fetch the upstream page and compare versions
pub fn check(recipe: &Recipe) -> Result<LivecheckResult> {
    let livecheck = recipe.livecheck.as_ref().ok_or_else(|| {
        Error::NotFound(format!("{} has no livecheck section", recipe.package.name))
    })?;

    let url = recipe.substitute(&livecheck.url, &[]);
    info!("Checking {} for new versions", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("mpd-kitchen/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::DownloadError(format!("HTTP client setup failed: {}", e)))?;

    let page = client
        .get(&url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", url, e)))?;

    check_page(recipe, livecheck, &page)
}
