//! A single download-and-install workflow.
//!
//! A `DownloadTask` owns one `DownloadRequest`, submits it to a
//! `DownloadService` at most once, and installs the result when the service
//! reports that the matching transfer finished. Service events arrive through
//! an `mpsc` channel and are only acted on from the task's own thread, via
//! `process_pending` or `wait`.

use super::events::{DownloadEvent, EventKind, Subscription};
use super::install::InstallAction;
use super::request::{AllowedNetwork, DownloadId, DownloadRequest, NotificationVisibility};
use super::service::{ConsoleNotifier, DownloadService, Installer, Notifier};
use crate::error::{ApkdlError, Result};
use crate::utils::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use super::request::DestinationPolicy;

/// Message shown right before the package is handed to the installer.
pub const COMPLETION_MESSAGE: &str = "Download complete, installing";

/// Called with the clicked ids when a notification for this task is clicked.
pub type ClickHandler = Box<dyn Fn(&[DownloadId]) + Send>;

/// What handling one service event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Installed(InstallAction),
    Clicked,
    Ignored,
}

pub struct DownloadTask {
    request: DownloadRequest,
    service: Arc<dyn DownloadService>,
    installer: Arc<dyn Installer>,
    notifier: Arc<dyn Notifier>,
    id: Option<DownloadId>,
    completed: bool,
    events: Receiver<DownloadEvent>,
    on_clicked: Option<ClickHandler>,
    _subscriptions: Vec<Subscription>,
}

impl DownloadTask {
    /// Parse `location` and register for completion and click events.
    ///
    /// Nothing is subscribed when the location is not a usable URL.
    pub fn new(
        service: Arc<dyn DownloadService>,
        installer: Arc<dyn Installer>,
        location: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self> {
        let mut request = DownloadRequest::parse(location)?;
        request.title = title.map(str::to_string);
        request.description = description.map(str::to_string);

        let (sender, events) = mpsc::channel();
        let subscriptions = vec![
            service.subscribe(EventKind::TransferComplete, sender.clone())?,
            service.subscribe(EventKind::NotificationClicked, sender)?,
        ];

        tracing::debug!(source = %request.source, "download task created");

        Ok(Self {
            request,
            service,
            installer,
            notifier: Arc::new(ConsoleNotifier),
            id: None,
            completed: false,
            events,
            on_clicked: None,
            _subscriptions: subscriptions,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_click_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[DownloadId]) + Send + 'static,
    {
        self.on_clicked = Some(Box::new(handler));
        self
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn id(&self) -> Option<DownloadId> {
        self.id
    }

    pub fn destination(&self) -> Option<&Path> {
        self.request.destination.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn is_frozen(&self, setting: &str) -> bool {
        if let Some(id) = self.id {
            tracing::warn!(%id, setting, "request already enqueued, ignoring change");
            return true;
        }
        false
    }

    pub fn restrict_to_unmetered_network(&mut self) {
        if !self.is_frozen("allowed_network") {
            self.request.allowed_network = AllowedNetwork::UnmeteredOnly;
        }
    }

    pub fn set_notification_visibility(&mut self, visibility: NotificationVisibility) {
        if !self.is_frozen("visibility") {
            self.request.visibility = visibility;
        }
    }

    pub fn set_title(&mut self, title: &str) {
        if !self.is_frozen("title") {
            self.request.title = Some(title.to_string());
        }
    }

    pub fn set_description(&mut self, description: &str) {
        if !self.is_frozen("description") {
            self.request.description = Some(description.to_string());
        }
    }

    /// Point the download at `path`, resolving an existing file there with `policy`.
    ///
    /// Returns the backup location if an existing file was moved aside.
    pub fn set_destination(
        &mut self,
        path: impl Into<PathBuf>,
        policy: DestinationPolicy,
    ) -> Result<Option<PathBuf>> {
        if self.is_frozen("destination") {
            return Ok(None);
        }

        let path = path.into();
        let backup = fs::prepare_destination(&path, policy)?;
        self.request.destination = Some(path);
        Ok(backup)
    }

    /// Submit the request. A task is enqueued at most once; use `restart` to
    /// abandon the current transfer and submit again.
    pub fn start(&mut self) -> Result<DownloadId> {
        if let Some(id) = self.id {
            return Err(ApkdlError::DoubleStart { id });
        }

        let id = self.service.enqueue(&self.request)?;
        tracing::info!(%id, source = %self.request.source, "download enqueued");
        self.id = Some(id);
        self.completed = false;
        Ok(id)
    }

    /// Remove the current transfer (if any) and enqueue the request again.
    ///
    /// The current id is kept when the service refuses the removal.
    pub fn restart(&mut self) -> Result<DownloadId> {
        if let Some(previous) = self.id {
            self.service.remove(&[previous])?;
            self.id = None;
            tracing::info!(%previous, "previous transfer removed for restart");
        }
        self.start()
    }

    /// Ask the service to remove exactly `ids`, which need not belong to this task.
    pub fn cancel(&self, ids: &[DownloadId]) -> Result<()> {
        tracing::debug!(?ids, "cancelling transfers");
        self.service.remove(ids)
    }

    pub fn cancel_own(&self) -> Result<()> {
        let id = self.id.ok_or(ApkdlError::NotStarted)?;
        self.cancel(&[id])
    }

    /// Install if `id` is this task's transfer and it has not completed yet.
    pub fn on_completion(&mut self, id: DownloadId) -> Result<Option<InstallAction>> {
        if self.id != Some(id) || self.completed {
            tracing::debug!(%id, own = ?self.id, "ignoring completion");
            return Ok(None);
        }

        self.completed = true;
        self.notifier.notify(COMPLETION_MESSAGE);
        self.install().map(Some)
    }

    /// Surface a terminal failure of this task's transfer as `TransferFailed`.
    ///
    /// Failures of other transfers, or after completion, are ignored.
    pub fn on_transfer_failed(&mut self, id: DownloadId, reason: &str) -> Result<()> {
        if self.id != Some(id) || self.completed {
            tracing::debug!(%id, own = ?self.id, "ignoring failure");
            return Ok(());
        }

        self.completed = true;
        Err(ApkdlError::TransferFailed {
            id,
            reason: reason.to_string(),
        })
    }

    /// Whether this task's transfer is among the clicked ones. Runs the click
    /// handler when it is.
    pub fn on_notification_clicked(&self, ids: &[DownloadId]) -> bool {
        let ours = self.id.map(|id| ids.contains(&id)).unwrap_or(false);
        if ours {
            if let Some(handler) = &self.on_clicked {
                handler(ids);
            }
        }
        ours
    }

    /// Build the install action for the destination file and dispatch it.
    pub fn install(&self) -> Result<InstallAction> {
        let destination = self
            .request
            .destination
            .as_deref()
            .ok_or(ApkdlError::DestinationNotSet)?;

        if !destination.is_file() {
            return Err(ApkdlError::install_failed(format!(
                "downloaded package missing at {destination:?}"
            )));
        }

        let action = InstallAction::for_package(destination)?;
        self.installer.dispatch(&action)?;
        Ok(action)
    }

    fn handle_event(&mut self, event: DownloadEvent) -> Result<TaskOutcome> {
        match event {
            DownloadEvent::TransferComplete(id) => Ok(match self.on_completion(id)? {
                Some(action) => TaskOutcome::Installed(action),
                None => TaskOutcome::Ignored,
            }),
            DownloadEvent::TransferFailed { id, reason } => {
                self.on_transfer_failed(id, &reason)?;
                Ok(TaskOutcome::Ignored)
            }
            DownloadEvent::NotificationClicked(ids) => {
                if self.on_notification_clicked(&ids) {
                    Ok(TaskOutcome::Clicked)
                } else {
                    Ok(TaskOutcome::Ignored)
                }
            }
        }
    }

    /// Handle every event already queued, without blocking.
    ///
    /// Stops at the first event whose handling fails and returns that error.
    /// Outcomes of the events handled before it are discarded; events queued
    /// after it stay queued for the next call.
    pub fn process_pending(&mut self) -> Result<Vec<TaskOutcome>> {
        let mut outcomes = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => outcomes.push(self.handle_event(event)?),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(outcomes)
    }

    /// Block until this task's transfer completes and the install is dispatched.
    ///
    /// Returns `TransferFailed` as soon as the service reports that the
    /// transfer ended without a file.
    pub fn wait(&mut self, timeout: Duration) -> Result<InstallAction> {
        let id = self.id.ok_or(ApkdlError::NotStarted)?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if let TaskOutcome::Installed(action) = self.handle_event(event)? {
                        return Ok(action);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ApkdlError::Timeout {
                        id,
                        seconds: timeout.as_secs(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ApkdlError::service_unavailable(
                        "event channel closed before the transfer completed",
                    ));
                }
            }
        }
    }
}
