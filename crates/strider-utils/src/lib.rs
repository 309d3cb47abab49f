//! # Strider Utilities
//!
//! Shared utilities, logging, and configuration for Strider.
//!
//! This crate provides the pieces every other Strider crate leans on: the
//! `tracing` subscriber set-up that turns trace events into the session log,
//! and the YAML configuration store with hot reload.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigOverrides, ConfigStore, ConfigWatcher, StepGranularity, TracerConfig};
// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_for_picker, LogFormat, LogLevel, LoggingError, LoggingOptions};
pub use tracing::{debug, error, info, trace, warn};
