// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common flag: JSON output
fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print the result as JSON")
}

/// Common argument: parallel jobs
fn jobs_arg() -> Arg {
    Arg::new("jobs")
        .short('j')
        .long("jobs")
        .value_name("N")
        .help("Number of parallel build jobs")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn build_cli() -> Command {
    Command::new("mpd-kitchen")
        .version(env!("CARGO_PKG_VERSION"))
        .author("mpd-kitchen contributors")
        .about("Build, install, supervise and smoke-test MPD from a recipe")
        .subcommand_required(false)
        .arg(
            Arg::new("recipe")
                .short('r')
                .long("recipe")
                .value_name("PATH")
                .global(true)
                .help("Recipe file (default: the bundled MPD recipe)"),
        )
        .arg(
            Arg::new("prefix")
                .short('p')
                .long("prefix")
                .value_name("DIR")
                .env("MPD_KITCHEN_PREFIX")
                .global(true)
                .help("Install prefix"),
        )
        .subcommand(
            Command::new("deps")
                .about("Resolve the recipe's dependencies on this host")
                .arg(flag("assume-present", "Assume every dependency is present"))
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("plan")
                .about("Show the build plan for this host (or another platform)")
                .arg(
                    Arg::new("os")
                        .long("os")
                        .value_parser(["macos", "linux"])
                        .help("Plan for this OS instead of the host"),
                )
                .arg(
                    Arg::new("os-version")
                        .long("os-version")
                        .requires("os")
                        .help("OS version to plan for (e.g. 11.7 or big_sur)"),
                )
                .arg(jobs_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("cook")
                .about("Fetch, build and install the recipe, then register its service")
                .arg(jobs_arg())
                .arg(
                    Arg::new("source-cache")
                        .long("source-cache")
                        .value_name("DIR")
                        .help("Directory for caching downloaded sources"),
                )
                .arg(
                    Arg::new("source-dir")
                        .long("source-dir")
                        .value_name("DIR")
                        .help("Build an already unpacked and patched source tree"),
                )
                .arg(flag("keep-builddir", "Keep the build directory after completion"))
                .arg(flag("validate-only", "Only validate the recipe"))
                .arg(flag("fetch-only", "Only fetch sources"))
                .arg(flag("assume-deps", "Assume every dependency is present"))
                .arg(flag("no-service", "Do not write a service descriptor"))
                .arg(flag("verify", "Run the smoke test after installing")),
        )
        .subcommand(
            Command::new("service")
                .about("Write the service descriptor for the installed package")
                .arg(flag("print", "Print the descriptor instead of writing it"))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["launchd", "systemd"])
                        .help("Descriptor format (default: native to this host)"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Smoke test the installed daemon")
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .help("Seconds to wait for the startup banner"),
                )
                .arg(json_arg()),
        )
        .subcommand(Command::new("caveats").about("Show post-install notes"))
        .subcommand(
            Command::new("livecheck")
                .about("Check upstream for a newer version")
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("mpd-kitchen.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
