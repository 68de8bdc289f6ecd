// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to build, install, supervise and
//! smoke-test a piece of upstream software. The bundled `recipes/mpd.toml`
//! is the reference recipe.

use crate::error::{Error, Result};
use crate::platform::{OsFamily, Platform};
use crate::service::ProcessType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A complete recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Text shown to the operator after a successful install
    #[serde(default)]
    pub caveats: Option<String>,

    /// Package metadata
    pub package: PackageSection,

    /// Source archive
    pub source: SourceSection,

    /// Patches to apply (optional)
    #[serde(default)]
    pub patches: Option<PatchSection>,

    /// Host requirements beyond plain dependencies
    #[serde(default)]
    pub requirements: RequirementsSection,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Build instructions
    pub build: BuildSection,

    /// Platform-specific build overrides
    #[serde(default)]
    pub platform: Vec<PlatformOverride>,

    /// Install layout
    #[serde(default)]
    pub install: InstallSection,

    /// Service descriptor template (optional)
    #[serde(default)]
    pub service: Option<ServiceSection>,

    /// Post-install smoke test (optional)
    #[serde(default)]
    pub test: Option<TestSection>,

    /// Upstream version discovery (optional)
    #[serde(default)]
    pub livecheck: Option<LivecheckSection>,

    /// Variables for substitution (optional)
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Directory the recipe was loaded from; local patches resolve against it
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Recipe {
    /// Substitute variables in a string
    ///
    /// Replaces `%(name)s` patterns with their values from:
    /// 1. Built-in variables (`name`, `version`)
    /// 2. Caller-supplied variables (`prefix`, `etc`, `config`, ...)
    /// 3. Custom variables from the [variables] section
    pub fn substitute(&self, template: &str, extra: &[(&str, &str)]) -> String {
        let mut result = template.to_string();

        result = result.replace("%(version)s", &self.package.version);
        result = result.replace("%(name)s", &self.package.name);

        for (key, value) in extra {
            result = result.replace(&format!("%({})s", key), value);
        }

        for (key, value) in &self.variables {
            result = result.replace(&format!("%({})s", key), value);
        }

        result
    }

    /// Get the archive URL with variables substituted
    pub fn archive_url(&self) -> String {
        self.substitute(&self.source.archive, &[])
    }

    /// Get the archive filename from the URL
    pub fn archive_filename(&self) -> String {
        self.archive_url()
            .split('/')
            .next_back()
            .unwrap_or("source.tar.gz")
            .to_string()
    }

    /// Version string including the revision suffix (`0.23.8_1`)
    pub fn full_version(&self) -> String {
        if self.package.revision == 0 {
            self.package.version.clone()
        } else {
            format!("{}_{}", self.package.version, self.package.revision)
        }
    }

    /// Dependencies that apply to the given platform
    pub fn dependencies_for(&self, platform: &Platform) -> Vec<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.applies_to(platform))
            .collect()
    }

    /// Overrides whose selector matches the given platform
    pub fn overrides_for(&self, platform: &Platform) -> Vec<&PlatformOverride> {
        self.platform
            .iter()
            .filter(|o| {
                platform.matches(o.os, o.min_version.as_deref(), o.max_version.as_deref())
            })
            .collect()
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Upstream version
    pub version: String,

    /// Recipe revision (for rebuilds of the same version)
    #[serde(default)]
    pub revision: u32,

    /// Short description
    #[serde(default)]
    pub summary: Option<String>,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,
}

/// Source archive section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Source archive URL
    ///
    /// Supports `%(version)s` substitution.
    pub archive: String,

    /// Checksum for the archive (sha256:...)
    pub checksum: String,

    /// Directory name after extraction (if different from archive name)
    #[serde(default)]
    pub extract_dir: Option<String>,
}

/// Patch configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatchSection {
    #[serde(default)]
    pub files: Vec<PatchInfo>,
}

/// Information about a single patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchInfo {
    /// Patch file, relative to the recipe directory
    pub file: String,

    /// Strip level for patch (default: 1)
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}

/// Host requirements
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequirementsSection {
    /// Minimum macOS release (version or release name)
    #[serde(default)]
    pub macos: Option<String>,

    /// Compilers known to miscompile or reject the sources
    #[serde(default)]
    pub fails_with: Vec<CompilerExclusion>,
}

/// A compiler major version that cannot build the package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerExclusion {
    /// Compiler family (`gcc`, `clang`)
    pub compiler: String,
    /// Major version; absent means every version of the family
    #[serde(default)]
    pub version: Option<String>,
}

/// When a dependency is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyRole {
    /// Needed only while building
    Build,
    /// Linked against or needed at runtime
    #[default]
    Runtime,
}

impl fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRole::Build => f.write_str("build"),
            DependencyRole::Runtime => f.write_str("runtime"),
        }
    }
}

/// A declared dependency
///
/// The version constraint is implicit: any installed version is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,

    #[serde(default)]
    pub role: DependencyRole,

    /// Only required on this OS family
    #[serde(default)]
    pub only_on: Option<OsFamily>,

    /// Provided by the OS itself on this family
    #[serde(default)]
    pub uses_from: Option<OsFamily>,

    /// Probe: an executable that must be on `PATH`
    #[serde(default)]
    pub binary: Option<String>,

    /// Probe: a pkg-config module that must exist
    #[serde(default)]
    pub pkg_config: Option<String>,
}

impl Dependency {
    /// Whether the dependency has to be resolved on this platform
    pub fn applies_to(&self, platform: &Platform) -> bool {
        match self.only_on {
            Some(os) => os == platform.os,
            None => true,
        }
    }

    /// Whether the OS provides the dependency on this platform
    pub fn provided_by(&self, platform: &Platform) -> bool {
        self.uses_from == Some(platform.os)
    }

    /// Whether the dependency is conditional on the OS family
    pub fn is_conditional(&self) -> bool {
        self.only_on.is_some() || self.uses_from.is_some()
    }
}

/// Supported build systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    #[default]
    Meson,
}

/// Build instructions section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub system: BuildSystem,

    /// Build output directory, relative to the source tree
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Ordered feature options (`name=enabled|disabled|<alternative>`)
    #[serde(default)]
    pub options: Vec<String>,

    /// Build C++ against libc++ when the compiler is clang
    #[serde(default)]
    pub libcxx: bool,

    /// Run the install step with a single job
    #[serde(default)]
    pub deparallelize_install: bool,

    /// Number of parallel jobs (default: auto)
    #[serde(default)]
    pub jobs: Option<u32>,

    /// Environment variables to set during build
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

fn default_build_dir() -> String {
    "build".to_string()
}

impl BuildSection {
    /// Parse the ordered feature options
    pub fn feature_flags(&self) -> Result<Vec<FeatureFlag>> {
        self.options.iter().map(|o| FeatureFlag::parse(o)).collect()
    }
}

/// Value of a feature option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureValue {
    Enabled,
    Disabled,
    /// Choose an alternative implementation (`upnp=pupnp`)
    Alternative(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Enabled => f.write_str("enabled"),
            FeatureValue::Disabled => f.write_str("disabled"),
            FeatureValue::Alternative(alt) => f.write_str(alt),
        }
    }
}

/// A single build feature option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    pub value: FeatureValue,
}

impl FeatureFlag {
    /// Parse `name=value`
    pub fn parse(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| Error::ParseError(format!("Invalid build option '{}': expected name=value", s)))?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return Err(Error::ParseError(format!("Invalid build option '{}'", s)));
        }

        let value = match value {
            "enabled" => FeatureValue::Enabled,
            "disabled" => FeatureValue::Disabled,
            other => FeatureValue::Alternative(other.to_string()),
        };

        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    /// Render as a meson `-D` argument
    pub fn to_meson_arg(&self) -> String {
        format!("-D{}={}", self.name, self.value)
    }
}

/// Build override for a platform selector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOverride {
    pub os: OsFamily,

    /// Inclusive lower bound (version or release name)
    #[serde(default)]
    pub min_version: Option<String>,

    /// Inclusive upper bound (version or release name)
    #[serde(default)]
    pub max_version: Option<String>,

    /// Preprocessor defines (`NAME=VALUE`) added to CFLAGS and CXXFLAGS
    #[serde(default)]
    pub defines: Vec<String>,

    /// Extra compiler flags
    #[serde(default)]
    pub cflags: Vec<String>,
}

/// Install layout section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InstallSection {
    /// Binaries expected in the keg's `bin/` after install
    #[serde(default)]
    pub binaries: Vec<String>,

    /// Configuration template, relative to the source tree
    #[serde(default)]
    pub config_template: Option<String>,

    /// File name of the installed configuration under `etc/<name>/`
    #[serde(default)]
    pub config_name: Option<String>,
}

/// Service descriptor template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    /// Command line; supports `%(opt_bin)s` and `%(prefix)s`
    pub run: Vec<String>,

    /// Restart the process whenever it exits
    #[serde(default)]
    pub keep_alive: bool,

    #[serde(default)]
    pub process_type: ProcessType,

    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Smoke test definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSection {
    /// Binary to launch (from the keg's `bin/`)
    pub binary: String,

    /// Arguments; `%(config)s` is the generated config file
    #[serde(default)]
    pub args: Vec<String>,

    /// Line fragment that signals the daemon has started
    pub banner: String,

    /// Per-OS banner overrides
    #[serde(default)]
    pub banner_by_os: HashMap<String, String>,

    /// Seconds to wait for the banner
    #[serde(default = "default_test_timeout")]
    pub timeout_secs: u64,

    /// Fragment expected in the greeting line
    pub greeting: String,

    /// Liveness command
    pub command: String,

    /// Fragment expected in the response to the liveness command
    pub ack: String,

    /// Conditions under which the smoke test is skipped
    #[serde(default)]
    pub skip_when: Vec<SkipRule>,
}

fn default_test_timeout() -> u64 {
    30
}

impl TestSection {
    /// Banner expected on the given platform
    pub fn banner_for(&self, platform: &Platform) -> &str {
        self.banner_by_os
            .get(platform.os.as_str())
            .map(String::as_str)
            .unwrap_or(&self.banner)
    }

    /// The first skip rule that applies to the platform
    pub fn skip_reason(&self, platform: &Platform) -> Option<String> {
        self.skip_when
            .iter()
            .find(|r| r.os == platform.os && platform.has_env(&r.env))
            .map(|r| format!("{} is set on {}", r.env, r.os))
    }
}

/// Skip the smoke test on `os` when `env` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRule {
    pub os: OsFamily,
    pub env: String,
}

/// Upstream version discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivecheckSection {
    /// Page listing upstream releases
    pub url: String,
    /// Regex whose first capture group is a version
    pub regex: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RECIPE: &str = r#"
[package]
name = "hello"
version = "2.12"
revision = 2

[source]
archive = "https://ftp.gnu.org/gnu/hello/hello-%(version)s.tar.gz"
checksum = "sha256:abc123"

[[dependencies]]
name = "meson"
role = "build"
binary = "meson"

[[dependencies]]
name = "gcc"
only_on = "linux"

[[dependencies]]
name = "curl"
uses_from = "macos"

[build]
options = ["docs=disabled", "nls=enabled", "backend=alt"]

[[platform]]
os = "macos"
max_version = "big_sur"
defines = ["NEW_SYM=OLD_SYM"]

[test]
binary = "hello"
banner = "ready"
greeting = "HELLO"
command = "ping"
ack = "OK"

[test.banner_by_os]
macos = "ready on darwin"

[[test.skip_when]]
os = "linux"
env = "CI_NO_AUDIO"
"#;

    fn sample() -> Recipe {
        toml::from_str(SAMPLE_RECIPE).unwrap()
    }

    #[test]
    fn test_parse_recipe() {
        let recipe = sample();
        assert_eq!(recipe.package.name, "hello");
        assert_eq!(recipe.package.revision, 2);
        assert_eq!(recipe.dependencies.len(), 3);
        assert_eq!(recipe.dependencies[0].role, DependencyRole::Build);
        assert_eq!(recipe.dependencies[1].role, DependencyRole::Runtime);
        assert_eq!(recipe.build.build_dir, "build");
        assert!(recipe.service.is_none());
    }

    #[test]
    fn test_variable_substitution() {
        let recipe = sample();
        assert_eq!(
            recipe.archive_url(),
            "https://ftp.gnu.org/gnu/hello/hello-2.12.tar.gz"
        );
        assert_eq!(recipe.archive_filename(), "hello-2.12.tar.gz");

        let run = recipe.substitute("%(opt_bin)s/%(name)s", &[("opt_bin", "/opt/hello/bin")]);
        assert_eq!(run, "/opt/hello/bin/hello");
    }

    #[test]
    fn test_full_version() {
        let mut recipe = sample();
        assert_eq!(recipe.full_version(), "2.12_2");
        recipe.package.revision = 0;
        assert_eq!(recipe.full_version(), "2.12");
    }

    #[test]
    fn test_feature_flags_keep_order() {
        let flags = sample().build.feature_flags().unwrap();
        let args: Vec<String> = flags.iter().map(|f| f.to_meson_arg()).collect();
        assert_eq!(args, vec!["-Ddocs=disabled", "-Dnls=enabled", "-Dbackend=alt"]);
        assert_eq!(flags[2].value, FeatureValue::Alternative("alt".to_string()));
    }

    #[test]
    fn test_feature_flag_rejects_garbage() {
        assert!(FeatureFlag::parse("novalue").is_err());
        assert!(FeatureFlag::parse("=enabled").is_err());
        assert!(FeatureFlag::parse("name=").is_err());
    }

    #[test]
    fn test_conditional_dependencies() {
        let recipe = sample();
        let linux = Platform::new(OsFamily::Linux, None);
        let mac = Platform::new(OsFamily::Macos, Some("13.1"));

        let on_linux: Vec<&str> = recipe
            .dependencies_for(&linux)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(on_linux, vec!["meson", "gcc", "curl"]);

        let on_mac: Vec<&str> = recipe
            .dependencies_for(&mac)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(on_mac, vec!["meson", "curl"]);

        assert!(recipe.dependencies[2].provided_by(&mac));
        assert!(!recipe.dependencies[2].provided_by(&linux));
    }

    #[test]
    fn test_overrides_for_platform() {
        let recipe = sample();
        let big_sur = Platform::new(OsFamily::Macos, Some("11.6"));
        let ventura = Platform::new(OsFamily::Macos, Some("13.0"));
        let linux = Platform::new(OsFamily::Linux, None);

        assert_eq!(recipe.overrides_for(&big_sur).len(), 1);
        assert!(recipe.overrides_for(&ventura).is_empty());
        assert!(recipe.overrides_for(&linux).is_empty());
    }

    #[test]
    fn test_banner_and_skip() {
        let recipe = sample();
        let test = recipe.test.as_ref().unwrap();
        let mac = Platform::new(OsFamily::Macos, Some("13.0"));
        let linux = Platform::new(OsFamily::Linux, None);

        assert_eq!(test.timeout_secs, 30);
        assert_eq!(test.banner_for(&mac), "ready on darwin");
        assert_eq!(test.banner_for(&linux), "ready");

        assert!(test.skip_reason(&linux).is_none());
        assert!(test.skip_reason(&linux.clone().with_env("CI_NO_AUDIO")).is_some());
        assert!(test.skip_reason(&mac.with_env("CI_NO_AUDIO")).is_none());
    }
}
