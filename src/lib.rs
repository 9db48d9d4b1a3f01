//! APK download helper library
//!
//! This library provides the download-and-install workflow behind the `apkdl` CLI.

pub mod commands;
pub mod core;
pub mod error;
pub mod utils;

pub use crate::core::request::{
    AllowedNetwork, DestinationPolicy, DownloadId, DownloadRequest, NotificationVisibility,
};
pub use crate::core::task::{DownloadTask, TaskOutcome};
pub use crate::error::{ApkdlError, Result};
