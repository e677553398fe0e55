//! JavaScript Plugin Bindings
//!
//! This module publishes the bridge into a Deno runtime. It provides:
//! - Deno ops forwarding each bridge call to the [`Bridge`] kept in `OpState`
//! - The `mediascout` global object plugins program against
//! - Creation of a runtime with both installed

use anyhow::{anyhow, Result};
use deno_core::error::AnyError;
use deno_core::{op2, v8, Extension, JsRuntime, Op, OpState, RuntimeOptions};
use serde::Deserialize;
use tracing::{debug, error, info, trace, warn};

use super::bridge::Bridge;
use super::encoding::decode_text;
use crate::core::error::ScoutError;

/// Handle type used by the Deno runtime
pub type JsHandle = v8::Global<v8::Value>;

/// Bridge stored in the runtime's `OpState`
pub type JsBridge = Bridge<JsHandle>;

#[derive(Debug, Deserialize)]
struct FetchArgs {
    url: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    referer: Option<String>,
}

/// Returns false when another fetch is outstanding
#[op2]
fn op_scout_fetch(
    state: &mut OpState,
    #[serde] args: FetchArgs,
    #[global] callback: v8::Global<v8::Value>,
    #[global] data: v8::Global<v8::Value>,
) -> Result<bool, AnyError> {
    let bridge = state.borrow_mut::<JsBridge>();
    let started = match args.body {
        Some(body) => bridge.post_content(&args.url, &body, callback, data, args.referer),
        None => bridge.get_content(&args.url, callback, data, args.referer),
    };
    match started {
        Ok(()) => Ok(true),
        Err(ScoutError::TaskInProgress) => Ok(false),
        Err(e) => Err(anyhow!(e)),
    }
}

#[op2(fast)]
fn op_scout_bind_referer(state: &mut OpState, #[string] host: &str, #[string] url: &str) {
    state.borrow_mut::<JsBridge>().bind_referer(host, url);
}

#[op2(fast)]
fn op_scout_force_unseekable(state: &mut OpState, #[string] host: &str) {
    state.borrow_mut::<JsBridge>().force_unseekable(host);
}

#[op2(fast)]
fn op_scout_warn(state: &mut OpState, #[string] message: &str) {
    state.borrow::<JsBridge>().warn(message);
}

#[op2(fast)]
fn op_scout_question(state: &mut OpState, #[string] message: &str) -> bool {
    state.borrow::<JsBridge>().question(message)
}

#[op2]
fn op_scout_res_show(state: &mut OpState, #[serde] items: serde_json::Value) -> Result<(), AnyError> {
    state.borrow::<JsBridge>().res_show(&items)?;
    Ok(())
}

#[op2]
fn op_scout_show_detail(state: &mut OpState, #[serde] record: serde_json::Value) -> Result<(), AnyError> {
    state.borrow::<JsBridge>().show_detail(record)?;
    Ok(())
}

#[op2]
fn op_scout_finish_parsing(state: &mut OpState, #[serde] record: serde_json::Value) -> Result<(), AnyError> {
    state.borrow::<JsBridge>().finish_parsing(record)?;
    Ok(())
}

#[op2]
#[string]
fn op_scout_final_url(state: &mut OpState) -> String {
    state.borrow::<JsBridge>().final_url().to_string()
}

/// Decode a fetched body; an empty label means UTF-8
#[op2]
#[string]
fn op_scout_decode(#[buffer] body: &[u8], #[string] label: String) -> Result<String, AnyError> {
    Ok(decode_text(body, Some(&label))?)
}

#[op2(fast)]
fn op_scout_log(#[string] level: &str, #[string] message: &str) {
    match level {
        "debug" => debug!(target: "plugin", "{}", message),
        "warn" => warn!(target: "plugin", "{}", message),
        "error" => error!(target: "plugin", "{}", message),
        "trace" => trace!(target: "plugin", "{}", message),
        _ => info!(target: "plugin", "{}", message),
    }
}

/// The `mediascout` global seen by plugins
const BRIDGE_JS: &str = r#"
"use strict";
((ops) => {
    class GetUrlError extends Error {
        constructor(message) {
            super(message);
            this.name = "GetUrlError";
        }
    }

    const requireString = (value, what) => {
        if (typeof value !== "string") {
            throw new TypeError(`${what} must be a string`);
        }
        return value;
    };

    const optionalString = (value, what) =>
        value === undefined || value === null ? null : requireString(value, what);

    const startFetch = (url, body, callback, data, referer) => {
        requireString(url, "url");
        if (typeof callback !== "function") {
            throw new TypeError("callback must be a function");
        }
        const args = { url, body, referer: optionalString(referer, "referer") };
        if (!ops.op_scout_fetch(args, callback, data)) {
            throw new GetUrlError("Another task is running.");
        }
    };

    const log = Object.freeze({
        debug: (message) => ops.op_scout_log("debug", String(message)),
        info: (message) => ops.op_scout_log("info", String(message)),
        warn: (message) => ops.op_scout_log("warn", String(message)),
        error: (message) => ops.op_scout_log("error", String(message)),
    });

    const getContent = (url, callback, data, referer) =>
        startFetch(url, null, callback, data, referer);

    const mediascout = {
        OPT_QL_HIGH: 1,
        OPT_QL_SUPER: 2,
        OPT_DOWNLOAD: 4,
        GetUrlError,
        log,
        get final_url() {
            return ops.op_scout_final_url();
        },
        decode: (body, charset) => {
            if (!(body instanceof Uint8Array)) {
                throw new TypeError("body must be a Uint8Array");
            }
            return ops.op_scout_decode(body, charset === undefined || charset === null ? "" : String(charset));
        },
        get_content: getContent,
        download_page: getContent,
        post_content: (url, body, callback, data, referer) =>
            startFetch(url, requireString(body, "body"), callback, data, referer),
        bind_referer: (host, url) =>
            ops.op_scout_bind_referer(requireString(host, "host"), requireString(url, "url")),
        force_unseekable: (host) => ops.op_scout_force_unseekable(requireString(host, "host")),
        warn: (message) => ops.op_scout_warn(String(message)),
        question: (message) => ops.op_scout_question(String(message)),
        res_show: (items) => {
            if (!Array.isArray(items)) {
                throw new TypeError("The argument is not a list.");
            }
            ops.op_scout_res_show(items);
        },
        show_detail: (record) => ops.op_scout_show_detail(record),
        finish_parsing: (record) => ops.op_scout_finish_parsing(record),
    };

    globalThis.mediascout = Object.freeze(mediascout);
})(Deno.core.ops);
"#;

/// Helper to create a JavaScript runtime with the bridge installed
///
/// The bridge is moved into the runtime's `OpState`; plugins reach it through
/// the `mediascout` global.
pub fn create_js_runtime_with_bindings(bridge: JsBridge) -> Result<JsRuntime> {
    let ext = Extension {
        name: "mediascout_bridge",
        ops: std::borrow::Cow::Borrowed(&[
            op_scout_fetch::DECL,
            op_scout_bind_referer::DECL,
            op_scout_force_unseekable::DECL,
            op_scout_warn::DECL,
            op_scout_question::DECL,
            op_scout_res_show::DECL,
            op_scout_show_detail::DECL,
            op_scout_finish_parsing::DECL,
            op_scout_final_url::DECL,
            op_scout_decode::DECL,
            op_scout_log::DECL,
        ]),
        ..Default::default()
    };

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![ext],
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(bridge);

    runtime
        .execute_script("<mediascout_bridge>", BRIDGE_JS.to_string().into())
        .map_err(|e| anyhow!("Failed to install bridge: {}", e))?;

    debug!("JavaScript runtime created with bridge bindings");
    Ok(runtime)
}
