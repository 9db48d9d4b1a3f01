use crate::error::{ApkdlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// File name used when the source URL has no usable last path segment.
const FALLBACK_FILE_NAME: &str = "download.apk";

/// Opaque identifier handed out by a download service for one enqueued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which networks a transfer may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedNetwork {
    #[default]
    Any,
    UnmeteredOnly,
}

/// How the download service reports a transfer to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationVisibility {
    Hidden,
    #[default]
    VisibleOngoing,
    VisibleCompleted,
    VisibleCompletedOnly,
}

impl NotificationVisibility {
    pub fn shows_progress(self) -> bool {
        matches!(self, NotificationVisibility::VisibleOngoing)
    }

    pub fn shows_completion(self) -> bool {
        !matches!(self, NotificationVisibility::Hidden)
    }
}

/// What to do when the destination path is already occupied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationPolicy {
    /// Delete the existing file, then download in its place
    #[default]
    Overwrite,
    /// Refuse with a `DestinationConflict` error
    Fail,
    /// Move the existing file aside to a timestamped backup
    Backup,
}

/// Desired transfer configuration, submitted to a `DownloadService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub source: Url,
    pub title: Option<String>,
    pub description: Option<String>,
    pub destination: Option<PathBuf>,
    pub allowed_network: AllowedNetwork,
    pub visibility: NotificationVisibility,
}

impl DownloadRequest {
    /// Parse a source location into a request with default settings.
    pub fn parse(location: &str) -> Result<Self> {
        let source = Url::parse(location).map_err(|e| ApkdlError::InvalidSourceLocation {
            location: location.to_string(),
            reason: e.to_string(),
        })?;

        match source.scheme() {
            // The parser already rejects an empty host for these schemes.
            "http" | "https" | "ftp" | "file" => {}
            other => {
                return Err(ApkdlError::InvalidSourceLocation {
                    location: location.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }

        Ok(Self {
            source,
            title: None,
            description: None,
            destination: None,
            allowed_network: AllowedNetwork::default(),
            visibility: NotificationVisibility::default(),
        })
    }

    /// Last non-empty path segment of the source, used to name the local file.
    pub fn suggested_file_name(&self) -> String {
        self.source
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    }

    /// Title shown by the service, falling back to the file name.
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.suggested_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_url() {
        let request = DownloadRequest::parse("https://example.com/app.apk").unwrap();
        assert_eq!(request.source.as_str(), "https://example.com/app.apk");
        assert_eq!(request.allowed_network, AllowedNetwork::Any);
        assert_eq!(request.visibility, NotificationVisibility::VisibleOngoing);
        assert!(request.destination.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = DownloadRequest::parse("not a uri \x00");
        assert!(matches!(
            result,
            Err(ApkdlError::InvalidSourceLocation { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unsupported_scheme() {
        let result = DownloadRequest::parse("mailto:someone@example.com");
        assert!(matches!(
            result,
            Err(ApkdlError::InvalidSourceLocation { .. })
        ));
    }

    #[test]
    fn test_parse_accepts_ftp_and_file() {
        let request = DownloadRequest::parse("ftp://mirror.example.com/x.apk").unwrap();
        assert_eq!(request.source.host_str(), Some("mirror.example.com"));
        assert_eq!(request.suggested_file_name(), "x.apk");

        let request = DownloadRequest::parse("file:///tmp/x.apk").unwrap();
        assert_eq!(request.source.scheme(), "file");
        assert_eq!(request.suggested_file_name(), "x.apk");
    }

    #[test]
    fn test_parse_host_handling() {
        // Extra slashes are skipped, so the first path segment becomes the host.
        let request = DownloadRequest::parse("http:///x").unwrap();
        assert_eq!(request.source.host_str(), Some("x"));

        assert!(matches!(
            DownloadRequest::parse("http://"),
            Err(ApkdlError::InvalidSourceLocation { .. })
        ));
    }

    #[test]
    fn test_suggested_file_name() {
        let request = DownloadRequest::parse("https://example.com/releases/app-1.2.apk").unwrap();
        assert_eq!(request.suggested_file_name(), "app-1.2.apk");

        let request = DownloadRequest::parse("https://example.com/").unwrap();
        assert_eq!(request.suggested_file_name(), "download.apk");
    }

    #[test]
    fn test_visibility_flags() {
        assert!(!NotificationVisibility::Hidden.shows_completion());
        assert!(NotificationVisibility::VisibleOngoing.shows_progress());
        assert!(!NotificationVisibility::VisibleCompletedOnly.shows_progress());
        assert!(NotificationVisibility::VisibleCompletedOnly.shows_completion());
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&DestinationPolicy::Backup).unwrap();
        assert_eq!(json, "\"backup\"");
        let parsed: AllowedNetwork = serde_json::from_str("\"unmetered-only\"").unwrap();
        assert_eq!(parsed, AllowedNetwork::UnmeteredOnly);
    }
}
