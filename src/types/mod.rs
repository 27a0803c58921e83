//! Core types for the extension runtime.
//!
//! This module provides foundational types used throughout the crate:
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Hub connection, runtime timing and logging configuration

mod config;
mod errors;

pub use config::{Config, HubConfig, LogFormat, LoggingConfig, RuntimeConfig, TopicCredentials};
pub use errors::{Error, Result};
