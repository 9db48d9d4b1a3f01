use crate::core::config::Config;
use crate::core::curl::CurlDownloadService;
use crate::core::install::{CommandInstaller, InstallAction};
use crate::core::request::{AllowedNetwork, DestinationPolicy, NotificationVisibility};
use crate::core::service::{DownloadService, Installer};
use crate::core::task::DownloadTask;
use crate::error::{ApkdlError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub output: Option<PathBuf>,
    pub unmetered: bool,
    pub visibility: Option<NotificationVisibility>,
    pub on_conflict: Option<DestinationPolicy>,
    pub no_install: bool,
    pub timeout_secs: Option<u64>,
}

/// Stands in for the installer when the user only wants the file.
struct KeepFile;

impl Installer for KeepFile {
    fn dispatch(&self, action: &InstallAction) -> Result<()> {
        tracing::info!(path = %action.path.display(), "install skipped");
        Ok(())
    }
}

pub fn download_package(options: &DownloadOptions) -> Result<()> {
    let config = Config::load()?;
    let service = Arc::new(CurlDownloadService::new(&config.downloads_dir)?);
    let install = config.auto_install && !options.no_install;
    let installer: Arc<dyn Installer> = if install {
        Arc::new(CommandInstaller::new(config.install_command.clone()))
    } else {
        Arc::new(KeepFile)
    };

    run_download(&config, options, service, installer).map(|_| ())
}

/// Configure, start and wait for one download task.
pub fn run_download(
    config: &Config,
    options: &DownloadOptions,
    service: Arc<dyn DownloadService>,
    installer: Arc<dyn Installer>,
) -> Result<InstallAction> {
    println!("Fetching package from {}", options.url);

    let mut task = DownloadTask::new(
        service,
        installer,
        &options.url,
        options.title.as_deref(),
        options.description.as_deref(),
    )?
    .with_click_handler(|ids| tracing::info!(?ids, "download notification clicked"));

    if options.unmetered || config.allowed_network == AllowedNetwork::UnmeteredOnly {
        task.restrict_to_unmetered_network();
    }
    task.set_notification_visibility(options.visibility.unwrap_or(config.notification_visibility));

    let destination = options
        .output
        .clone()
        .unwrap_or_else(|| config.downloads_dir.join(task.request().suggested_file_name()));
    let policy = options.on_conflict.unwrap_or(config.destination_policy);
    if let Some(backup) = task.set_destination(destination.clone(), policy)? {
        println!("Existing file moved to {backup:?}");
    }

    let id = task.start()?;
    println!("Download {id} queued, saving to {destination:?}");

    let timeout = Duration::from_secs(options.timeout_secs.unwrap_or(config.wait_timeout_secs));
    match task.wait(timeout) {
        Ok(action) => {
            println!("✅ Package ready: {:?}", action.path);
            Ok(action)
        }
        Err(e @ ApkdlError::Timeout { .. }) => {
            println!("⚠️  Download {id} did not finish in time, cancelling");
            task.cancel_own()?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}
