use crate::core::config::Config;
use crate::core::install::{CommandInstaller, InstallAction};
use crate::core::service::Installer;
use crate::error::{ApkdlError, Result};
use std::path::Path;

pub fn install_package(path: &Path) -> Result<()> {
    let config = Config::load()?;
    let installer = CommandInstaller::new(config.install_command);
    install_with(&installer, path).map(|_| ())
}

pub fn install_with(installer: &dyn Installer, path: &Path) -> Result<InstallAction> {
    if !path.is_file() {
        return Err(ApkdlError::install_failed(format!(
            "no package file at {path:?}"
        )));
    }

    let action = InstallAction::for_package(path)?;
    println!("Installing {} ({})", action.data, action.mime_type);
    installer.dispatch(&action)?;
    println!("✅ Install dispatched");

    Ok(action)
}
