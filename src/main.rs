// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let recipe = cli.recipe.as_deref();
    let prefix = cli.prefix.as_deref();

    match cli.command {
        Some(Commands::Deps {
            assume_present,
            json,
        }) => commands::cmd_deps(recipe, prefix, assume_present, json),

        Some(Commands::Plan {
            os,
            os_version,
            jobs,
            json,
        }) => commands::cmd_plan(
            recipe,
            prefix,
            os.as_deref(),
            os_version.as_deref(),
            jobs,
            json,
        ),

        Some(Commands::Cook {
            jobs,
            source_cache,
            source_dir,
            keep_builddir,
            validate_only,
            fetch_only,
            assume_deps,
            no_service,
            verify,
        }) => commands::cmd_cook(
            recipe,
            prefix,
            source_cache.as_deref(),
            source_dir.as_deref(),
            jobs,
            keep_builddir,
            validate_only,
            fetch_only,
            assume_deps,
            no_service,
            verify,
        ),

        Some(Commands::Service { print, format }) => {
            commands::cmd_service(recipe, prefix, print, format.as_deref())
        }

        Some(Commands::Verify { timeout, json }) => {
            commands::cmd_verify(recipe, prefix, timeout, json)
        }

        Some(Commands::Caveats) => commands::cmd_caveats(recipe, prefix),

        Some(Commands::Livecheck { json }) => commands::cmd_livecheck(recipe, json),

        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "mpd-kitchen",
                &mut std::io::stdout(),
            );
            Ok(())
        }

        None => {
            println!("mpd-kitchen v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'mpd-kitchen --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mpd-kitchen",
            "plan",
            "--os",
            "macos",
            "--os-version",
            "big_sur",
            "--prefix",
            "/opt/homebrew",
        ])
        .unwrap();
        assert_eq!(cli.prefix.as_deref(), Some("/opt/homebrew"));
        assert!(matches!(
            cli.command,
            Some(Commands::Plan { os: Some(_), .. })
        ));
    }

    #[test]
    fn test_os_version_requires_os() {
        assert!(Cli::try_parse_from(["mpd-kitchen", "plan", "--os-version", "11"]).is_err());
    }
}
