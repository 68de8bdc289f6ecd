// src/recipe/kitchen/plan.rs

//! Build planning: turns a recipe's build section and the host's platform
//! strategy into the exact build-system invocations.

use crate::error::Result;
use crate::platform::{OsFamily, Platform};
use crate::recipe::format::{BuildSection, FeatureFlag, Recipe};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use super::install::PrefixLayout;

/// Platform-specific build adjustments, selected once per configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformStrategy {
    /// Identifier of the platform the strategy was selected for
    pub platform: String,
    /// Preprocessor defines (`NAME=VALUE`)
    pub defines: Vec<String>,
    /// Extra compiler flags
    pub cflags: Vec<String>,
    /// Build C++ against libc++
    pub libcxx: bool,
}

impl PlatformStrategy {
    /// Evaluate the recipe's override table against a platform
    pub fn select(recipe: &Recipe, platform: &Platform) -> Self {
        let mut strategy = Self {
            platform: platform.id(),
            libcxx: recipe.build.libcxx && platform.os == OsFamily::Macos,
            ..Self::default()
        };

        for ov in recipe.overrides_for(platform) {
            strategy.defines.extend(ov.defines.iter().cloned());
            strategy.cflags.extend(ov.cflags.iter().cloned());
        }

        debug!(
            "Platform strategy for {}: {} define(s), {} flag(s)",
            strategy.platform,
            strategy.defines.len(),
            strategy.cflags.len()
        );
        strategy
    }

    /// Flags appended to both CFLAGS and CXXFLAGS
    fn compiler_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self.defines.iter().map(|d| format!("-D{}", d)).collect();
        flags.extend(self.cflags.iter().cloned());
        flags
    }
}

/// Steps of a meson build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    Setup,
    Compile,
    Install,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Setup => f.write_str("setup"),
            BuildPhase::Compile => f.write_str("compile"),
            BuildPhase::Install => f.write_str("install"),
        }
    }
}

/// One build-system invocation
#[derive(Debug, Clone, Serialize)]
pub struct BuildStep {
    pub phase: BuildPhase,
    pub program: String,
    pub args: Vec<String>,
    /// Maximum parallel jobs for this step
    pub jobs: u32,
}

impl BuildStep {
    pub fn is_parallel(&self) -> bool {
        self.jobs > 1
    }

    /// Command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything needed to build a recipe on one host
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub platform: String,
    /// Build directory, relative to the source tree
    pub build_dir: String,
    /// Install prefix handed to the build system
    pub keg: PathBuf,
    /// Lock held from the install step until the prefix is finished
    pub lock_path: PathBuf,
    /// Environment for every step
    pub env: BTreeMap<String, String>,
    /// Setup, compile and install, in order
    pub steps: Vec<BuildStep>,
}

impl BuildPlan {
    pub fn step(&self, phase: BuildPhase) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.phase == phase)
    }
}

/// Standard meson arguments for a keg install
fn std_meson_args(layout: &PrefixLayout) -> Vec<String> {
    vec![
        format!("--prefix={}", layout.keg.display()),
        format!("--libdir={}", layout.keg.join("lib").display()),
        "--buildtype=release".to_string(),
        "--wrap-mode=nofallback".to_string(),
    ]
}

/// Merge the fixed flag set with the platform strategy into a build plan
pub fn configure(
    build: &BuildSection,
    strategy: &PlatformStrategy,
    layout: &PrefixLayout,
    jobs: u32,
) -> Result<BuildPlan> {
    let flags: Vec<FeatureFlag> = build.feature_flags()?;
    let jobs = build.jobs.unwrap_or(jobs).max(1);

    let mut setup_args = vec![
        "setup".to_string(),
        build.build_dir.clone(),
        format!("--sysconfdir={}", layout.etc.display()),
    ];
    setup_args.extend(flags.iter().map(FeatureFlag::to_meson_arg));
    setup_args.extend(std_meson_args(layout));

    let mut env: BTreeMap<String, String> = build
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let compiler_flags = strategy.compiler_flags();
    let mut cxx_flags = compiler_flags.clone();
    if strategy.libcxx {
        cxx_flags.push("-stdlib=libc++".to_string());
    }
    append_flags(&mut env, "CFLAGS", &compiler_flags);
    append_flags(&mut env, "CXXFLAGS", &cxx_flags);

    let install_jobs = if build.deparallelize_install { 1 } else { jobs };
    let mut install_args = vec![
        "install".to_string(),
        "-C".to_string(),
        build.build_dir.clone(),
    ];
    if build.deparallelize_install {
        install_args.push("--no-rebuild".to_string());
    }

    let steps = vec![
        BuildStep {
            phase: BuildPhase::Setup,
            program: "meson".to_string(),
            args: setup_args,
            jobs: 1,
        },
        BuildStep {
            phase: BuildPhase::Compile,
            program: "meson".to_string(),
            args: vec![
                "compile".to_string(),
                "-C".to_string(),
                build.build_dir.clone(),
                "-j".to_string(),
                jobs.to_string(),
            ],
            jobs,
        },
        BuildStep {
            phase: BuildPhase::Install,
            program: "meson".to_string(),
            args: install_args,
            jobs: install_jobs,
        },
    ];

    Ok(BuildPlan {
        platform: strategy.platform.clone(),
        build_dir: build.build_dir.clone(),
        keg: layout.keg.clone(),
        lock_path: layout.lock_path.clone(),
        env,
        steps,
    })
}

fn append_flags(env: &mut BTreeMap<String, String>, key: &str, flags: &[String]) {
    if flags.is_empty() {
        return;
    }
    let joined = flags.join(" ");
    env.entry(key.to_string())
        .and_modify(|v| {
            v.push(' ');
            v.push_str(&joined);
        })
        .or_insert(joined);
}
