#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use commands::project::PassArgs;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "localpkg")]
#[command(author, version, about = "Route local package exports into per-package bundles", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Pipeline config file (defaults to `localpkg.json` in the working directory)
    #[arg(long, global = true, value_name = "FILE", env = "LOCALPKG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Print the resolved exports of package manifests
    Exports {
        /// Manifests to resolve (default: every package.json under the working directory)
        manifests: Vec<PathBuf>,
    },

    /// Show how source files are split into bundles
    Plan {
        #[command(flatten)]
        pass: PassArgs,
    },

    /// Print an import map for the delivered package exports
    Importmap {
        #[command(flatten)]
        pass: PassArgs,

        /// URL prefix the output directory is served from
        #[arg(long, default_value = "/")]
        base_url: String,
    },

    /// Bundle every package and write the outputs
    Build {
        #[command(flatten)]
        pass: PassArgs,

        /// Minify output (default)
        #[arg(long, conflicts_with = "no_minify")]
        minify: bool,

        /// Do not minify output
        #[arg(long)]
        no_minify: bool,

        /// Emit source maps for every output
        #[arg(long)]
        sourcemap: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose, cli.json);

    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Exports { manifests }) => commands::exports::run(&cwd, &manifests, cli.json),
        Some(Commands::Plan { pass }) => commands::plan::run(&cwd, config_path, &pass, cli.json),
        Some(Commands::Importmap { pass, base_url }) => {
            commands::importmap::run(&cwd, config_path, &pass, &base_url, cli.json)
        }
        Some(Commands::Build {
            pass,
            minify,
            no_minify,
            sourcemap,
        }) => {
            let action = commands::build::BuildAction {
                pass,
                minify: match (minify, no_minify) {
                    (true, _) => Some(true),
                    (false, true) => Some(false),
                    (false, false) => None,
                },
                sourcemap,
            };
            commands::build::run(&cwd, config_path, action, cli.json)
        }
    }
}
