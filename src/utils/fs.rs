use crate::core::request::DestinationPolicy;
use crate::error::{ApkdlError, Result};
use std::path::{Path, PathBuf};

fn map_permission(path: &Path, e: std::io::Error) -> ApkdlError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ApkdlError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ApkdlError::from(e),
    }
}

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| map_permission(path, e))?;
    }
    Ok(())
}

pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    if path.is_file() {
        std::fs::remove_file(path).map_err(|e| map_permission(path, e))?;
        return Ok(true);
    }
    Ok(false)
}

/// Sibling path `<name>.<UTC timestamp>.bak` for an existing file.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());

    let backup_name = format!(
        "{name}.{}.bak",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    );

    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(backup_name)
}

/// Clear `path` for a new download according to `policy`.
///
/// Only regular files count as a conflict. Returns the backup location when
/// the existing file was moved aside.
pub fn prepare_destination(path: &Path, policy: DestinationPolicy) -> Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }

    match policy {
        DestinationPolicy::Overwrite => {
            remove_file_if_exists(path)?;
            tracing::debug!(path = %path.display(), "removed existing destination file");
            Ok(None)
        }
        DestinationPolicy::Fail => Err(ApkdlError::DestinationConflict {
            path: path.to_path_buf(),
        }),
        DestinationPolicy::Backup => {
            let backup = backup_path_for(path);
            std::fs::rename(path, &backup).map_err(|e| map_permission(path, e))?;
            tracing::info!(
                from = %path.display(),
                to = %backup.display(),
                "moved existing destination aside"
            );
            Ok(Some(backup))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.apk");
        std::fs::write(&target, b"old").unwrap();

        let backup = prepare_destination(&target, DestinationPolicy::Overwrite).unwrap();
        assert!(backup.is_none());
        assert!(!target.exists());
    }

    #[test]
    fn test_fail_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.apk");
        std::fs::write(&target, b"old").unwrap();

        let result = prepare_destination(&target, DestinationPolicy::Fail);
        assert!(matches!(result, Err(ApkdlError::DestinationConflict { .. })));
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn test_backup_moves_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app.apk");
        std::fs::write(&target, b"old").unwrap();

        let backup = prepare_destination(&target, DestinationPolicy::Backup)
            .unwrap()
            .unwrap();
        assert!(!target.exists());
        assert_eq!(std::fs::read(&backup).unwrap(), b"old");
        let name = backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("app.apk."));
        assert!(name.ends_with(".bak"));
    }

    #[test]
    fn test_directory_is_not_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let result = prepare_destination(dir.path(), DestinationPolicy::Fail).unwrap();
        assert!(result.is_none());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_missing_file_is_not_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing.apk");
        assert!(prepare_destination(&target, DestinationPolicy::Fail)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ensure_dir_exists_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
