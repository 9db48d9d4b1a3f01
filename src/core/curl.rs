//! `DownloadService` backed by one `curl` process per transfer.

use super::events::{DownloadEvent, EventHub, EventKind, Subscription};
use super::request::{AllowedNetwork, DownloadId, DownloadRequest};
use super::service::DownloadService;
use crate::error::{ApkdlError, Result};
use crate::utils::fs;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Set to `1` by the host when the active network is metered.
pub const METERED_ENV: &str = "APKDL_METERED";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Transfer {
    child: Child,
    destination: PathBuf,
    title: String,
    announce_completion: bool,
}

type TransferMap = Arc<Mutex<HashMap<DownloadId, Transfer>>>;

fn lock(transfers: &TransferMap) -> MutexGuard<'_, HashMap<DownloadId, Transfer>> {
    transfers
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CurlDownloadService {
    curl: PathBuf,
    downloads_dir: PathBuf,
    hub: EventHub,
    next_id: AtomicU64,
    transfers: TransferMap,
}

impl CurlDownloadService {
    /// Locate `curl` on the PATH. Requests without a destination are saved
    /// under `downloads_dir`.
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Result<Self> {
        let curl = which::which("curl")
            .map_err(|e| ApkdlError::service_unavailable(format!("curl not found: {e}")))?;
        Ok(Self::with_curl(curl, downloads_dir))
    }

    pub fn with_curl(curl: impl Into<PathBuf>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            curl: curl.into(),
            downloads_dir: downloads_dir.into(),
            hub: EventHub::new(),
            next_id: AtomicU64::new(1),
            transfers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Where `request` will be written.
    pub fn destination_for(&self, request: &DownloadRequest) -> PathBuf {
        request
            .destination
            .clone()
            .unwrap_or_else(|| self.downloads_dir.join(request.suggested_file_name()))
    }

    /// Report a click on the notification for `ids`.
    pub fn click(&self, ids: &[DownloadId]) -> usize {
        self.hub
            .publish(DownloadEvent::NotificationClicked(ids.to_vec()))
    }

    pub fn active_transfers(&self) -> usize {
        lock(&self.transfers).len()
    }

    fn network_is_metered() -> bool {
        std::env::var(METERED_ENV)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn spawn_curl(&self, request: &DownloadRequest, destination: &Path) -> Result<Child> {
        let child = Command::new(&self.curl)
            .arg("-L") // Follow redirects
            .arg("-f") // Fail on HTTP errors
            .arg("-s")
            .arg("-S") // Still print errors
            .arg("-H")
            .arg(format!("User-Agent: apkdl/{}", env!("CARGO_PKG_VERSION")))
            .arg("-o")
            .arg(destination)
            .arg(request.source.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }
}

impl DownloadService for CurlDownloadService {
    fn enqueue(&self, request: &DownloadRequest) -> Result<DownloadId> {
        if request.allowed_network == AllowedNetwork::UnmeteredOnly && Self::network_is_metered() {
            return Err(ApkdlError::service_unavailable(
                "transfer is restricted to unmetered networks and the current network is metered",
            ));
        }

        let destination = self.destination_for(request);
        if let Some(parent) = destination.parent() {
            fs::ensure_dir_exists(parent)?;
        }

        let child = self.spawn_curl(request, &destination)?;
        let id = DownloadId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let title = request.display_title();

        if request.visibility.shows_progress() {
            println!("Downloading {title}...");
        }
        tracing::debug!(
            %id,
            pid = child.id(),
            destination = %destination.display(),
            "curl started"
        );

        lock(&self.transfers).insert(
            id,
            Transfer {
                child,
                destination,
                title,
                announce_completion: request.visibility.shows_completion(),
            },
        );

        let transfers = Arc::clone(&self.transfers);
        let hub = self.hub.clone();
        thread::spawn(move || watch_transfer(id, transfers, hub));

        Ok(id)
    }

    fn remove(&self, ids: &[DownloadId]) -> Result<()> {
        let mut transfers = lock(&self.transfers);
        for id in ids {
            let Some(mut transfer) = transfers.remove(id) else {
                tracing::debug!(%id, "remove: unknown transfer");
                continue;
            };

            if let Err(e) = transfer.child.kill() {
                tracing::debug!(%id, error = %e, "curl already exited");
            }
            let _ = transfer.child.wait();
            if let Err(e) = fs::remove_file_if_exists(&transfer.destination) {
                tracing::warn!(%id, error = %e, "could not remove partial download");
            }
            tracing::info!(%id, "transfer removed");
        }
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, sender: Sender<DownloadEvent>) -> Result<Subscription> {
        Ok(self.hub.subscribe(kind, sender))
    }
}

impl Drop for CurlDownloadService {
    fn drop(&mut self) {
        let ids: Vec<DownloadId> = lock(&self.transfers).keys().copied().collect();
        if !ids.is_empty() {
            let _ = self.remove(&ids);
        }
    }
}

fn watch_transfer(id: DownloadId, transfers: TransferMap, hub: EventHub) {
    loop {
        let finished = {
            let mut map = lock(&transfers);
            let Some(transfer) = map.get_mut(&id) else {
                // Removed while running: no completion for cancelled transfers.
                return;
            };
            match transfer.child.try_wait() {
                Ok(Some(status)) => map.remove(&id).map(|t| (t, Ok(status))),
                Ok(None) => None,
                Err(e) => map.remove(&id).map(|t| (t, Err(e))),
            }
        };

        if let Some((transfer, status)) = finished {
            let event = match finish_transfer(id, transfer, status) {
                None => DownloadEvent::TransferComplete(id),
                Some(reason) => DownloadEvent::TransferFailed { id, reason },
            };
            hub.publish(event);
            return;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Report the end of a transfer. Returns the failure reason, if any.
fn finish_transfer(
    id: DownloadId,
    mut transfer: Transfer,
    status: std::io::Result<ExitStatus>,
) -> Option<String> {
    let failure = match status {
        Ok(status) if status.success() => None,
        Ok(status) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = transfer.child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            Some(format!(
                "curl exited with status {:?}: {}",
                status.code(),
                stderr.trim()
            ))
        }
        Err(e) => Some(e.to_string()),
    };

    match &failure {
        None => {
            tracing::info!(%id, destination = %transfer.destination.display(), "transfer finished");
            if transfer.announce_completion {
                println!("Downloaded {} to {:?}", transfer.title, transfer.destination);
            }
        }
        Some(reason) => {
            tracing::warn!(%id, %reason, "transfer failed");
            if let Err(e) = fs::remove_file_if_exists(&transfer.destination) {
                tracing::warn!(%id, error = %e, "could not remove partial download");
            }
            if transfer.announce_completion {
                println!("Download of {} failed: {reason}", transfer.title);
            }
        }
    }

    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::NotificationVisibility;
    use std::sync::mpsc;

    fn service(dir: &Path) -> CurlDownloadService {
        CurlDownloadService::with_curl("curl", dir)
    }

    #[test]
    fn test_destination_defaults_to_downloads_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let request = DownloadRequest::parse("https://example.com/files/app.apk").unwrap();
        assert_eq!(service.destination_for(&request), dir.path().join("app.apk"));
    }

    #[test]
    fn test_explicit_destination_wins() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let mut request = DownloadRequest::parse("https://example.com/app.apk").unwrap();
        request.destination = Some(dir.path().join("custom.apk"));
        assert_eq!(service.destination_for(&request), dir.path().join("custom.apk"));
    }

    #[test]
    fn test_remove_unknown_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        service.remove(&[DownloadId(99)]).unwrap();
        assert_eq!(service.active_transfers(), 0);
    }

    #[test]
    fn test_click_reaches_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let (tx, rx) = mpsc::channel();
        let _subscription = service
            .subscribe(EventKind::NotificationClicked, tx)
            .unwrap();

        assert_eq!(service.click(&[DownloadId(4), DownloadId(5)]), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            DownloadEvent::NotificationClicked(vec![DownloadId(4), DownloadId(5)])
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_transfer_publishes_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = CurlDownloadService::with_curl("/bin/false", dir.path());
        let (tx, rx) = mpsc::channel();
        let _subscription = service
            .subscribe(EventKind::TransferComplete, tx)
            .unwrap();

        let mut request = DownloadRequest::parse("https://example.com/app.apk").unwrap();
        request.visibility = NotificationVisibility::Hidden;
        let id = service.enqueue(&request).unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            DownloadEvent::TransferFailed { id: failed, reason } => {
                assert_eq!(failed, id);
                assert!(reason.contains("exited with status"));
            }
            other => panic!("expected a failure event, got {other:?}"),
        }
        assert_eq!(service.active_transfers(), 0);
        assert!(!dir.path().join("app.apk").exists());
    }

    #[test]
    fn test_missing_curl_binary_fails_to_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let service =
            CurlDownloadService::with_curl(dir.path().join("no-such-curl"), dir.path());
        let request = DownloadRequest::parse("https://example.com/app.apk").unwrap();
        assert!(matches!(service.enqueue(&request), Err(ApkdlError::Io(_))));
        assert_eq!(service.active_transfers(), 0);
    }
}
