//! scoda CLI: build, inspect and resolve `.scoda` data packages.

mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::Settings;

#[derive(Parser)]
#[command(name = "scoda", version, about = "Self-contained data packages")]
struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a .scoda container from a SQLite database
    Pack {
        /// Source database
        db: PathBuf,
        /// Output file (default: <db>.scoda)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON file with manifest values (name, version, dependencies, ...)
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Package name
        #[arg(long)]
        name: Option<String>,
        /// Package version
        #[arg(long = "version")]
        pkg_version: Option<String>,
        /// Extra file to embed, as INTERNAL=PATH (repeatable)
        #[arg(long = "asset", value_name = "INTERNAL=PATH")]
        assets: Vec<String>,
        /// Tool definitions to embed as mcp_tools.json
        #[arg(long)]
        mcp_tools: Option<PathBuf>,
        /// Changelog to embed as CHANGELOG.md
        #[arg(long)]
        changelog: Option<PathBuf>,
    },
    /// Show a container's manifest and entries
    Inspect {
        file: PathBuf,
        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
        /// Skip checksum verification
        #[arg(long)]
        no_verify: bool,
    },
    /// Verify a container's payload checksum
    Verify { file: PathBuf },
    /// List packages in the packages directory
    List {
        /// Packages directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a package's dependencies and show what gets attached
    Resolve {
        /// Package name
        name: String,
        /// Packages directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Work with a static hub index
    Hub {
        #[command(subcommand)]
        action: HubAction,
    },
}

#[derive(Subcommand)]
enum HubAction {
    /// Compare installed packages with the hub
    Status {
        /// Hub index file
        #[arg(long)]
        index: Option<PathBuf>,
        /// Packages directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what installing a package would download, in order
    Order {
        name: String,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Install a package and its dependencies from the hub
    Install {
        name: String,
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "scoda=warn",
        1 => "scoda=info",
        _ => "scoda=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Pack {
            db,
            output,
            metadata,
            name,
            pkg_version,
            assets,
            mcp_tools,
            changelog,
        } => {
            commands::pack::run(&commands::pack::PackArgs {
                db: &db,
                output: output.as_deref(),
                metadata: metadata.as_deref(),
                name: name.as_deref(),
                version: pkg_version.as_deref(),
                assets: &assets,
                mcp_tools: mcp_tools.as_deref(),
                changelog: changelog.as_deref(),
            })?;
            Ok(())
        }

        Commands::Inspect {
            file,
            json,
            no_verify,
        } => commands::inspect::run(&file, json, !no_verify),

        Commands::Verify { file } => commands::verify::run(&file),

        Commands::List { dir, json } => {
            let settings = settings(&cwd, dir.as_deref(), None)?;
            commands::list::run(&settings.packages_dir, json)
        }

        Commands::Resolve { name, dir } => {
            let settings = settings(&cwd, dir.as_deref(), None)?;
            commands::resolve::run(&settings.packages_dir, &name)?;
            Ok(())
        }

        Commands::Hub { action } => match action {
            HubAction::Status { index, dir, json } => {
                let settings = settings(&cwd, dir.as_deref(), index.as_deref())?;
                commands::hub::status(settings.hub_index.as_deref(), &settings.packages_dir, json)
            }
            HubAction::Order { name, index, dir } => {
                let settings = settings(&cwd, dir.as_deref(), index.as_deref())?;
                let index = settings.hub_index.as_deref();
                commands::hub::order(index, &settings.packages_dir, &name)?;
                Ok(())
            }
            HubAction::Install { name, index, dir } => {
                let settings = settings(&cwd, dir.as_deref(), index.as_deref())?;
                let index = settings.hub_index.as_deref();
                commands::hub::install(index, &settings.packages_dir, &name)?;
                Ok(())
            }
        },
    }
}

/// Resolve packages directory and hub index from flags, environment and `scoda.toml`.
fn settings(cwd: &Path, dir: Option<&Path>, index: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = Settings::load(cwd, dir, index)?;
    debug!(
        "packages dir {}, hub index {}",
        settings.packages_dir.display(),
        settings
            .hub_index
            .as_deref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    Ok(settings)
}
