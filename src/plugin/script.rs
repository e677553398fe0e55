//! Scripting engine seam
//!
//! The registry, the bridge and the fetch task never talk to a concrete
//! scripting engine. They work against [`ScriptRuntime`], whose `Handle` is a
//! counted reference to a value owned by the engine: cloning a handle takes a
//! reference and dropping it gives the reference back. Ownership of the
//! callback and user data of an outstanding fetch is therefore expressed by
//! moving handles around, never by paired increment and decrement calls.

use std::path::Path;

use bytes::Bytes;

use super::bridge::Bridge;

/// Argument passed from the host into a script function
#[derive(Debug, Clone)]
pub enum ScriptArg<H> {
    Str(String),
    Int(i64),
    /// Raw bytes, a `Uint8Array` on the JavaScript side
    Bytes(Bytes),
    Value(H),
}

/// Failures raised by the scripting engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("failed to load module {module}: {message}")]
    Load { module: String, message: String },

    #[error("uncaught exception: {0}")]
    Exception(String),

    #[error("type error: {0}")]
    Type(String),
}

/// A scripting engine able to host plugins
///
/// All methods run on the thread that owns the engine. Implementations must not
/// hold any borrow of the bridge while calling into script code, because the
/// script may call straight back into the bridge.
pub trait ScriptRuntime {
    /// Counted reference to an engine value
    type Handle: Clone + 'static;

    /// Evaluate a plugin file and return its module object
    fn load_module(&mut self, module_id: &str, path: &Path) -> Result<Self::Handle, ScriptError>;

    /// Look up `name` on `object`. Missing, `undefined` and `null` are all `None`.
    fn attribute(&mut self, object: &Self::Handle, name: &str) -> Result<Option<Self::Handle>, ScriptError>;

    fn is_callable(&mut self, value: &Self::Handle) -> bool;

    /// Read a sequence of strings
    fn string_list(&mut self, value: &Self::Handle) -> Result<Vec<String>, ScriptError>;

    /// Call a function for its side effects; the return value is discarded
    fn call(&mut self, function: &Self::Handle, args: Vec<ScriptArg<Self::Handle>>) -> Result<(), ScriptError>;

    /// Run `f` against the bridge installed in this engine
    fn with_bridge<T>(&mut self, f: impl FnOnce(&mut Bridge<Self::Handle>) -> T) -> T;
}
