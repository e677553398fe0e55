//! JavaScript Runtime Module
//!
//! This module runs plugins on Deno Core. Each plugin file is evaluated as a
//! classic script inside its own function scope, so top-level declarations of
//! different plugins never collide, and the scope hands back an object with
//! the module contract (`hosts`, `parse`, `search`, `search_album`).

use anyhow::{Context, Result};
use deno_core::error::JsError;
use deno_core::{v8, JsRuntime};
use std::path::Path;
use tracing::info;

use super::bridge::Bridge;
use super::js_bindings::{create_js_runtime_with_bindings, JsBridge, JsHandle};
use super::script::{ScriptArg, ScriptError, ScriptRuntime};

/// Names a plugin may define at its top level
const CONTRACT: [&str; 4] = ["hosts", "parse", "search", "search_album"];

/// Wrap plugin source so its declarations are captured in a module object
fn wrap_plugin_source(file_name: &str, source: &str) -> String {
    let exports = CONTRACT
        .iter()
        .map(|name| format!("{0}: typeof {0} === \"undefined\" ? undefined : {0}", name))
        .collect::<Vec<_>>()
        .join(",\n        ");
    format!(
        "(function () {{\n{}\n;\n    return {{\n        {}\n    }};\n}})();\n//# sourceURL={}\n",
        source, exports, file_name
    )
}

/// JavaScript Runtime wrapper for executing JavaScript plugins
pub struct JsRuntimeWrapper {
    /// The Deno Core runtime instance
    runtime: JsRuntime,
}

impl JsRuntimeWrapper {
    /// Create a runtime exposing `bridge` to plugins
    pub fn new(bridge: JsBridge) -> Result<Self> {
        let runtime = create_js_runtime_with_bindings(bridge)?;
        Ok(Self { runtime })
    }

    /// Evaluate an expression and render the result as a string
    pub fn evaluate_to_string(&mut self, code: &str) -> Result<String> {
        let value = self
            .runtime
            .execute_script("<evaluate>", code.to_string().into())
            .context("Failed to evaluate JavaScript expression")?;
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        let text = local
            .to_string(scope)
            .map(|s| s.to_rust_string_lossy(scope))
            .unwrap_or_default();
        Ok(text)
    }
}

impl ScriptRuntime for JsRuntimeWrapper {
    type Handle = JsHandle;

    fn load_module(&mut self, module_id: &str, path: &Path) -> std::result::Result<JsHandle, ScriptError> {
        info!(module = module_id, path = %path.display(), "Loading JavaScript plugin");

        let source = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScriptError::ModuleNotFound(module_id.to_string()),
            _ => ScriptError::Load {
                module: module_id.to_string(),
                message: e.to_string(),
            },
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(module_id);

        self.runtime
            .execute_script("<plugin_module>", wrap_plugin_source(file_name, &source).into())
            .map_err(|e| ScriptError::Load {
                module: module_id.to_string(),
                message: e.to_string(),
            })
    }

    fn attribute(&mut self, object: &JsHandle, name: &str) -> std::result::Result<Option<JsHandle>, ScriptError> {
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, object);
        let object = v8::Local::<v8::Object>::try_from(local)
            .map_err(|_| ScriptError::Type(format!("cannot read '{}' of a non-object", name)))?;
        let key = v8::String::new(scope, name)
            .ok_or_else(|| ScriptError::Type(format!("invalid attribute name '{}'", name)))?;

        match object.get(scope, key.into()) {
            Some(value) if !value.is_null_or_undefined() => Ok(Some(v8::Global::new(scope, value))),
            _ => Ok(None),
        }
    }

    fn is_callable(&mut self, value: &JsHandle) -> bool {
        let scope = &mut self.runtime.handle_scope();
        v8::Local::new(scope, value).is_function()
    }

    fn string_list(&mut self, value: &JsHandle) -> std::result::Result<Vec<String>, ScriptError> {
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        let array = v8::Local::<v8::Array>::try_from(local)
            .map_err(|_| ScriptError::Type("expected an array of strings".to_string()))?;

        let mut items = Vec::with_capacity(array.length() as usize);
        for i in 0..array.length() {
            let item = array
                .get_index(scope, i)
                .filter(|item| item.is_string())
                .and_then(|item| item.to_string(scope))
                .ok_or_else(|| ScriptError::Type(format!("element {} is not a string", i)))?;
            items.push(item.to_rust_string_lossy(scope));
        }
        Ok(items)
    }

    fn call(&mut self, function: &JsHandle, args: Vec<ScriptArg<JsHandle>>) -> std::result::Result<(), ScriptError> {
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, function);
        let function = v8::Local::<v8::Function>::try_from(local)
            .map_err(|_| ScriptError::Type("value is not a function".to_string()))?;

        let mut argv: Vec<v8::Local<v8::Value>> = Vec::with_capacity(args.len());
        for arg in args {
            let value: v8::Local<v8::Value> = match arg {
                ScriptArg::Str(s) => v8::String::new(scope, &s)
                    .ok_or_else(|| ScriptError::Type("string argument too long".to_string()))?
                    .into(),
                ScriptArg::Int(n) => v8::Number::new(scope, n as f64).into(),
                ScriptArg::Bytes(bytes) => {
                    let len = bytes.len();
                    let store = v8::ArrayBuffer::new_backing_store_from_vec(bytes.to_vec()).make_shared();
                    let buffer = v8::ArrayBuffer::with_backing_store(scope, &store);
                    v8::Uint8Array::new(scope, buffer, 0, len)
                        .ok_or_else(|| ScriptError::Type("byte argument too long".to_string()))?
                        .into()
                }
                ScriptArg::Value(handle) => v8::Local::new(scope, handle),
            };
            argv.push(value);
        }

        let tc = &mut v8::TryCatch::new(scope);
        let recv: v8::Local<v8::Value> = v8::undefined(tc).into();
        let result = function.call(tc, recv, &argv);
        if result.is_none() {
            let message = match tc.exception() {
                Some(exception) => JsError::from_v8_exception(tc, exception).to_string(),
                None => "execution terminated".to_string(),
            };
            return Err(ScriptError::Exception(message));
        }
        tc.perform_microtask_checkpoint();
        Ok(())
    }

    fn with_bridge<T>(&mut self, f: impl FnOnce(&mut Bridge<JsHandle>) -> T) -> T {
        let op_state = self.runtime.op_state();
        let mut state = op_state.borrow_mut();
        f(state.borrow_mut::<JsBridge>())
    }
}
