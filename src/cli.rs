// src/cli.rs
//! CLI definitions for mpd-kitchen
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "mpd-kitchen")]
#[command(author = "mpd-kitchen contributors")]
#[command(version)]
#[command(about = "Build, install, supervise and smoke-test MPD from a recipe", long_about = None)]
pub struct Cli {
    /// Recipe file (default: the bundled MPD recipe)
    #[arg(short, long, global = true)]
    pub recipe: Option<String>,

    /// Install prefix
    #[arg(short, long, global = true, env = "MPD_KITCHEN_PREFIX")]
    pub prefix: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the recipe's dependencies on this host
    Deps {
        /// Assume every dependency is present instead of probing the host
        #[arg(long)]
        assume_present: bool,

        /// Print the resolved set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the build plan for this host (or another platform)
    Plan {
        /// Plan for this OS instead of the host
        #[arg(long, value_parser = ["macos", "linux"])]
        os: Option<String>,

        /// OS version to plan for (e.g. 11.7 or big_sur)
        #[arg(long, requires = "os")]
        os_version: Option<String>,

        /// Number of parallel build jobs
        #[arg(short, long)]
        jobs: Option<u32>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch, build and install the recipe, then register its service
    Cook {
        /// Number of parallel build jobs (default: CPU count)
        #[arg(short, long)]
        jobs: Option<u32>,

        /// Directory for caching downloaded sources
        #[arg(long)]
        source_cache: Option<String>,

        /// Build an already unpacked and patched source tree
        #[arg(long)]
        source_dir: Option<String>,

        /// Keep the build directory after completion
        #[arg(long)]
        keep_builddir: bool,

        /// Only validate the recipe
        #[arg(long)]
        validate_only: bool,

        /// Only fetch sources
        #[arg(long, conflicts_with = "source_dir")]
        fetch_only: bool,

        /// Assume every dependency is present instead of probing the host
        #[arg(long)]
        assume_deps: bool,

        /// Do not write a service descriptor
        #[arg(long)]
        no_service: bool,

        /// Run the smoke test after installing
        #[arg(long)]
        verify: bool,
    },

    /// Write the service descriptor for the installed package
    Service {
        /// Print the descriptor instead of writing it
        #[arg(long)]
        print: bool,

        /// Descriptor format (default: native to this host)
        #[arg(long, value_parser = ["launchd", "systemd"])]
        format: Option<String>,
    },

    /// Smoke test the installed daemon
    Verify {
        /// Seconds to wait for the startup banner
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show post-install notes
    Caveats,

    /// Check upstream for a newer version
    Livecheck {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
