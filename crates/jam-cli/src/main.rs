//! jam - packages buildpacks and keeps their dependencies current

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use jam_pkg::{CatalogClient, HttpTransport, DEFAULT_API};
use std::path::PathBuf;
use std::process::ExitCode;

mod pack;
mod update;

#[cfg(test)]
mod test_support;

const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "jam")]
#[command(version)]
#[command(about = "Package buildpacks and manage their dependencies", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a buildpack into a .tgz
    Pack {
        /// Path to the buildpack.toml
        #[arg(long)]
        buildpack: Option<PathBuf>,

        /// Version to stamp into the packaged buildpack
        #[arg(long)]
        version: Option<String>,

        /// Path of the .tgz to write
        #[arg(long)]
        output: Option<PathBuf>,

        /// Download dependencies into the package
        #[arg(long)]
        offline: bool,

        /// Only package dependencies supporting this stack
        #[arg(long)]
        stack: Option<String>,
    },

    /// Refresh dependencies within their declared constraints
    UpdateDependencies {
        /// Path to the buildpack.toml
        #[arg(long)]
        buildpack_file: Option<PathBuf>,

        /// Dependency catalog API
        #[arg(long, default_value = DEFAULT_API)]
        api: String,
    },
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("missing required flag --{flag}"))
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Pack {
            buildpack,
            version,
            output,
            offline,
            stack,
        } => {
            let options = pack::PackOptions {
                buildpack: required(buildpack, "buildpack")?,
                output: required(output, "output")?,
                version: required(version, "version")?,
                offline,
                stack,
            };
            let transport = HttpTransport::new()?;
            pack::pack_buildpack(&options, transport)?;
        }

        Commands::UpdateDependencies {
            buildpack_file,
            api,
        } => {
            let options = update::UpdateOptions {
                buildpack_file: required(buildpack_file, "buildpack-file")?,
            };
            let client = CatalogClient::new(api)?;
            let result = update::update_dependencies(&options, &client)?;
            result.print_summary();
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("JAM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
