use super::service::Installer;
use crate::error::{ApkdlError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use url::Url;

pub const PACKAGE_MIME_TYPE: &str = "application/vnd.android.package-archive";
pub const ACTION_VIEW: &str = "android.intent.action.VIEW";

/// A "view this file as an installable package" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallAction {
    pub action: String,
    pub data: Url,
    pub mime_type: String,
    /// Launch the handler outside the caller's task stack
    pub new_task: bool,
    pub path: PathBuf,
}

impl InstallAction {
    pub fn for_package(path: &Path) -> Result<Self> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let data = Url::from_file_path(&absolute).map_err(|_| {
            ApkdlError::install_failed(format!("cannot express {absolute:?} as a file URI"))
        })?;

        Ok(Self {
            action: ACTION_VIEW.to_string(),
            data,
            mime_type: PACKAGE_MIME_TYPE.to_string(),
            new_task: true,
            path: absolute,
        })
    }
}

/// Installs packages by running a command line with the package path appended.
pub struct CommandInstaller {
    command: Vec<String>,
}

impl Default for CommandInstaller {
    fn default() -> Self {
        Self::new(default_install_command())
    }
}

impl CommandInstaller {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl Installer for CommandInstaller {
    fn dispatch(&self, action: &InstallAction) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ApkdlError::config_error("install_command is empty"))?;

        let program_path = which::which(program).map_err(|e| {
            ApkdlError::service_unavailable(format!("installer '{program}' not found: {e}"))
        })?;

        tracing::info!(
            installer = %program_path.display(),
            package = %action.data,
            mime = %action.mime_type,
            "dispatching install"
        );

        let status = Command::new(&program_path)
            .args(args)
            .arg(&action.path)
            .status()?;

        if !status.success() {
            return Err(ApkdlError::install_failed(format!(
                "{program} exited with status {:?}",
                status.code()
            )));
        }

        Ok(())
    }
}

pub fn default_install_command() -> Vec<String> {
    vec!["adb".to_string(), "install".to_string(), "-r".to_string()]
}
