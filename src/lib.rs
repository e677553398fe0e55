//! MediaScout Library
//!
//! This library hosts site plugins that resolve playable media URLs and
//! search results, including plugin discovery, the bridge plugins call into
//! and the ambient configuration and logging services.

pub mod core;
pub mod plugin;

// Re-export commonly used types
pub use crate::core::{Config, ScoutError};
pub use plugin::{PluginManager, PluginRegistry, SessionCookies, StreamHints};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
