pub mod config;
pub mod curl;
pub mod events;
pub mod install;
pub mod request;
pub mod service;
pub mod task;
