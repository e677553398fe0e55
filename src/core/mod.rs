//! Core services module
//!
//! This module provides the ambient services shared by the plugin host:
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod logging;
pub mod error;

pub use config::{CliArgs, Command, Config, Quality};
pub use logging::Logger;
pub use error::{ScoutError, Result, ErrorContext};
