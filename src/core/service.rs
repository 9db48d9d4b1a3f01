use super::events::{DownloadEvent, EventKind, Subscription};
use super::install::InstallAction;
use super::request::{DownloadId, DownloadRequest};
use crate::error::Result;
use std::sync::mpsc::Sender;

/// The platform component that performs transfers.
///
/// Implementations own queuing, progress and retry. Events are pushed
/// asynchronously to subscribers; delivery may happen on any thread.
pub trait DownloadService: Send + Sync {
    /// Submit a transfer and return the identifier the service assigned to it.
    fn enqueue(&self, request: &DownloadRequest) -> Result<DownloadId>;

    /// Best-effort removal of the given transfers.
    fn remove(&self, ids: &[DownloadId]) -> Result<()>;

    /// Register `sender` for one kind of event. The registration lasts until
    /// the returned `Subscription` is dropped.
    fn subscribe(&self, kind: EventKind, sender: Sender<DownloadEvent>) -> Result<Subscription>;
}

/// Hands a downloaded package to whatever installs it. Fire and forget.
pub trait Installer: Send + Sync {
    fn dispatch(&self, action: &InstallAction) -> Result<()>;
}

/// Shows a short informational message to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("{message}");
    }
}
