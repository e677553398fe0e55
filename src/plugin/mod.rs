//! Plugin system module
//!
//! This module provides the plugin host:
//! - Plugin registry discovering plugin files and routing by host and name
//! - Bridge functions plugins call into, backed by a single-flight fetch task
//! - Scripting engine seam with a Deno implementation
//! - Side tables (referers, unseekable hosts, session cookies) for downstream
//!   collaborators
//! - Plugin manager driving the host event loop

pub mod bridge;
pub mod cookies;
pub mod encoding;
pub mod fetch;
pub mod frontend;
pub mod hints;
pub mod http;
pub mod js_bindings;
pub mod js_runtime;
pub mod manager;
pub mod registry;
pub mod script;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{Bridge, Delivery};
pub use cookies::SessionCookies;
pub use encoding::decode_text;
pub use fetch::{Continuation, FetchEvent, FetchOutcome, FetchPhase, FetchRequest, FetchTask};
pub use frontend::{ConsoleFrontend, Frontend, ParseSink, Record, ResultItem, ResultView, UserInterface};
pub use hints::StreamHints;
pub use http::{HttpMethod, HttpRequest, HttpResponse, NetworkClient, NetworkError, ReqwestClient};
pub use js_bindings::{create_js_runtime_with_bindings, JsBridge, JsHandle};
pub use js_runtime::JsRuntimeWrapper;
pub use manager::{ManagerConfig, PluginManager};
pub use registry::{DirectoryInventory, PluginInventory, PluginRegistry};
pub use script::{ScriptArg, ScriptError, ScriptRuntime};
pub use types::{AlbumSearch, LoadError, ParseOptions, Plugin, PluginInfo};
