use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use apkdl::commands;
use apkdl::commands::download::DownloadOptions;
use apkdl::{DestinationPolicy, NotificationVisibility};

#[derive(Parser)]
#[clap(name = "apkdl")]
#[clap(about = "Download an APK and hand it to the installer")]
#[clap(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a package and install it when the transfer completes
    Download {
        /// Source URL of the package
        url: String,
        /// Title shown while downloading
        #[clap(long)]
        title: Option<String>,
        /// Description shown while downloading
        #[clap(long)]
        description: Option<String>,
        /// Where to save the package (default: downloads directory)
        #[clap(short, long)]
        output: Option<PathBuf>,
        /// Only download over an unmetered network
        #[clap(long)]
        unmetered: bool,
        /// How the download is reported
        #[clap(long, value_enum)]
        visibility: Option<NotificationVisibility>,
        /// What to do with an existing file at the destination
        #[clap(long, value_enum)]
        on_conflict: Option<DestinationPolicy>,
        /// Keep the file without installing it
        #[clap(long)]
        no_install: bool,
        /// Seconds to wait for the transfer before cancelling it
        #[clap(long)]
        timeout: Option<u64>,
    },
    /// Install an already downloaded package
    Install {
        /// Path to the package file
        file: PathBuf,
    },
    /// Show or change settings
    Config {
        #[clap(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the current settings
    Show,
    /// Print the location of the config file
    Path,
    /// Change one setting
    Set {
        /// Setting name (e.g. destination_policy)
        key: String,
        /// New value
        value: String,
    },
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "apkdl=debug" } else { "apkdl=info" };
    let filter = EnvFilter::try_from_env("APKDL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Download {
            url,
            title,
            description,
            output,
            unmetered,
            visibility,
            on_conflict,
            no_install,
            timeout,
        } => {
            let options = DownloadOptions {
                url,
                title,
                description,
                output,
                unmetered,
                visibility,
                on_conflict,
                no_install,
                timeout_secs: timeout,
            };
            commands::download::download_package(&options).map_err(|e| anyhow::anyhow!(e))
        }
        Commands::Install { file } => {
            commands::install::install_package(&file).map_err(|e| anyhow::anyhow!(e))
        }
        Commands::Config { command } => match command.unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => {
                commands::config::show_config().map_err(|e| anyhow::anyhow!(e))
            }
            ConfigCommands::Path => {
                commands::config::show_config_path().map_err(|e| anyhow::anyhow!(e))
            }
            ConfigCommands::Set { key, value } => {
                commands::config::set_config_value(&key, &value).map_err(|e| anyhow::anyhow!(e))
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
