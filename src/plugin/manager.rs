//! Plugin manager
//!
//! Owns the scripting runtime, the routing tables and the receiving end of
//! the fetch completion channel, and runs the host side of the event loop:
//! entry points are called synchronously, network completions re-enter the
//! runtime on a later turn through [`PluginManager::process_next_event`].

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use url::Url;

use super::bridge::{Bridge, Delivery};
use super::fetch::{Continuation, FetchEvent, FetchTask, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_REDIRECTS};
use super::frontend::Frontend;
use super::hints::StreamHints;
use super::http::NetworkClient;
use super::registry::{PluginInventory, PluginRegistry};
use super::script::{ScriptArg, ScriptRuntime};
use super::types::{ParseOptions, Plugin};
use crate::core::config::{Config, Quality};
use crate::core::error::{Result, ScoutError};

/// Configuration for the plugin manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Plugin file extension without the dot
    pub extension: String,
    pub quality: Quality,
    /// Timeout applied to each hop of a fetch
    pub fetch_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            extension: "js".to_string(),
            quality: Quality::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            extension: config.plugins.extension.clone(),
            quality: config.parser.quality,
            fetch_timeout: config.network.timeout(),
            max_redirects: config.network.max_redirects,
        }
    }
}

/// Manager for the plugin system
pub struct PluginManager<R: ScriptRuntime> {
    config: ManagerConfig,
    /// Declared before the runtime so plugin handles are released first
    registry: PluginRegistry<R::Handle>,
    runtime: R,
    hints: StreamHints,
    events: mpsc::UnboundedReceiver<FetchEvent>,
}

impl<R: ScriptRuntime> PluginManager<R> {
    /// Create a manager and its runtime
    ///
    /// `build_runtime` receives the bridge the runtime must expose to plugins.
    pub fn new<F>(
        config: ManagerConfig,
        client: Arc<dyn NetworkClient>,
        frontend: Frontend,
        build_runtime: F,
    ) -> Result<Self>
    where
        F: FnOnce(Bridge<R::Handle>) -> Result<R>,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let hints = StreamHints::new();
        let fetch = FetchTask::new(client, tx)
            .with_timeout(config.fetch_timeout)
            .with_max_redirects(config.max_redirects);
        let runtime = build_runtime(Bridge::new(fetch, hints.clone(), frontend))?;

        Ok(Self {
            config,
            runtime,
            registry: PluginRegistry::new(),
            hints,
            events,
        })
    }

    /// Discover and load all plugins, failing on the first broken one
    pub fn discover(&mut self, dirs: &[PathBuf]) -> Result<PluginInventory> {
        info!(dirs = ?dirs, "discovering plugins");
        self.registry.discover(&mut self.runtime, dirs, &self.config.extension)
    }

    /// Resolve the plugin serving `url`'s host and ask it to parse `url`
    pub fn parse_url(&mut self, url: &str, download: bool) -> Result<()> {
        let parsed = Url::parse(url).map_err(|e| ScoutError::InvalidArgument(format!("invalid url '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ScoutError::InvalidArgument(format!("url has no host: {}", url)))?;
        let plugin = self
            .registry
            .lookup_by_host(host)
            .ok_or_else(|| ScoutError::PluginNotFound(format!("no plugin serves host {}", host)))?;
        self.call_parse(&plugin, url, download)
    }

    /// Ask the plugin called `name` to parse `url`
    pub fn parse_with(&mut self, name: &str, url: &str, download: bool) -> Result<()> {
        let plugin = self.plugin(name)?;
        self.call_parse(&plugin, url, download)
    }

    pub fn search(&mut self, name: &str, keyword: &str, page: u32) -> Result<()> {
        let plugin = self.plugin(name)?;
        info!(plugin = %plugin.name(), keyword, page, "search");
        plugin.search(&mut self.runtime, keyword, page)?;
        Ok(())
    }

    /// Album search; rejected when the plugin defines none
    pub fn search_album(&mut self, name: &str, keyword: &str, page: u32) -> Result<()> {
        let plugin = self.plugin(name)?;
        let album_search = plugin.album_search().ok_or_else(|| {
            ScoutError::InvalidArgument(format!("plugin {} does not support album search", name))
        })?;
        info!(plugin = %plugin.name(), keyword, page, "album search");
        album_search.call(&mut self.runtime, keyword, page)?;
        Ok(())
    }

    fn plugin(&self, name: &str) -> Result<Rc<Plugin<R::Handle>>> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| ScoutError::PluginNotFound(name.to_string()))
    }

    fn call_parse(&mut self, plugin: &Plugin<R::Handle>, url: &str, download: bool) -> Result<()> {
        let options = ParseOptions::new(self.config.quality, download);
        info!(plugin = %plugin.name(), url, download, "parse");
        plugin.parse(&mut self.runtime, url, options)?;
        Ok(())
    }

    /// Whether a fetch is outstanding
    pub fn is_busy(&mut self) -> bool {
        self.runtime.with_bridge(|bridge| bridge.is_fetching())
    }

    /// Wait for the next fetch completion and dispatch it
    ///
    /// The callback is called as `callback(body, data, charset)`: the body as
    /// raw bytes and the response charset, empty when the server named none.
    /// A failing callback is logged and does not stop the loop. Returns false
    /// once the completion channel is closed.
    pub async fn process_next_event(&mut self) -> bool {
        let Some(event) = self.events.recv().await else {
            return false;
        };
        debug!(exchange = event.exchange(), "fetch event received");

        let delivery = self.runtime.with_bridge(|bridge| bridge.handle_fetch_event(event));
        if let Some(Delivery { body, charset, final_url, continuation }) = delivery {
            let Continuation { callback, data } = continuation;
            let args = vec![
                ScriptArg::Bytes(body),
                ScriptArg::Value(data),
                ScriptArg::Str(charset.unwrap_or_default()),
            ];
            if let Err(e) = self.runtime.call(&callback, args) {
                let err = ScoutError::CallbackError(e.to_string());
                error!(url = %final_url, error = %err, "fetch callback failed");
            }
        }
        true
    }

    /// Dispatch completions until no fetch is outstanding
    pub async fn run_until_idle(&mut self) {
        while self.is_busy() {
            if !self.process_next_event().await {
                break;
            }
        }
    }

    pub fn hints(&self) -> &StreamHints {
        &self.hints
    }

    pub fn registry(&self) -> &PluginRegistry<R::Handle> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::encoding::decode_text;
    use crate::plugin::http::HttpResponse;
    use crate::plugin::script::ScriptError;
    use crate::plugin::testing::{
        bytes_arg, int_arg, str_arg, FakeHandle, FakeModule, FakeRuntime, FakeValue, RecordingFrontend, ScriptedClient,
    };
    use serde_json::json;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        manager: PluginManager<FakeRuntime>,
        recorder: Rc<RecordingFrontend>,
        _dir: TempDir,
    }

    fn harness(client: ScriptedClient, modules: Vec<(&str, FakeModule)>) -> Harness {
        let dir = TempDir::new().unwrap();
        for (id, _) in &modules {
            fs::write(dir.path().join(format!("{}.js", id)), "").unwrap();
        }

        let recorder = Rc::new(RecordingFrontend::default());
        let config = ManagerConfig {
            quality: Quality::High,
            ..Default::default()
        };
        let mut manager = PluginManager::<FakeRuntime>::new(config, Arc::new(client), Frontend::shared(recorder.clone()), |bridge| {
            let mut runtime = FakeRuntime::new(bridge);
            for (id, module) in modules {
                runtime.install(id, module);
            }
            Ok(runtime)
        })
        .unwrap();
        manager.discover(&[dir.path().to_path_buf()]).unwrap();

        Harness {
            manager,
            recorder,
            _dir: dir,
        }
    }

    fn to_script_error(err: ScoutError) -> ScriptError {
        ScriptError::Exception(format!("{}: {}", err.error_type(), err))
    }

    /// Callback that reports the fetched page as a parse result
    fn finish_with_body() -> FakeHandle {
        FakeValue::function(|bridge, args| {
            let charset = str_arg(args, 2);
            let body = decode_text(&bytes_arg(args, 0), Some(&charset)).map_err(to_script_error)?;
            let tag = str_arg(args, 1);
            bridge
                .finish_parsing(json!({"tag": tag, "body": body, "final_url": bridge.final_url()}))
                .map_err(to_script_error)
        })
    }

    /// `parse` fetching `http://v.example/api?u=<url>`
    fn fetching_parse() -> FakeHandle {
        FakeValue::function(|bridge, args| {
            let url = str_arg(args, 0);
            assert_eq!(int_arg(args, 1), 1);
            bridge
                .get_content(
                    &format!("http://v.example/api?u={}", url.len()),
                    finish_with_body(),
                    FakeValue::str("episode"),
                    Some(url),
                )
                .map_err(to_script_error)
        })
    }

    #[tokio::test]
    async fn test_parse_routes_by_host_and_delivers() {
        let client = ScriptedClient::new()
            .respond("http://v.example/api?u=22", HttpResponse::redirect(302, "/real"))
            .respond("http://v.example/real", HttpResponse::new(200, "stream-list"));
        let requests = client.requests();
        let mut h = harness(
            client,
            vec![("plugin_video", FakeModule::plugin(&["v.example"]).with("parse", fetching_parse()))],
        );

        h.manager.parse_url("http://v.example/watch", false).unwrap();
        assert!(h.manager.is_busy());
        h.manager.run_until_idle().await;

        let parsed = h.recorder.parsed();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["tag"], json!("episode"));
        assert_eq!(parsed[0]["body"], json!("stream-list"));
        assert_eq!(parsed[0]["final_url"], json!("http://v.example/real"));
        // referer carried to the redirect hop
        let requests = requests.lock().unwrap();
        assert_eq!(requests[1].referer.as_deref(), Some("http://v.example/watch"));
    }

    #[tokio::test]
    async fn test_body_bytes_reach_callback_intact() {
        // "中文" in GBK, not valid UTF-8
        let page: &'static [u8] = &[0xD6, 0xD0, 0xCE, 0xC4];
        let received = Rc::new(RefCell::new(None));
        let sink = received.clone();
        let search = FakeValue::function(move |bridge, _| {
            let sink = sink.clone();
            let callback = FakeValue::function(move |_, args| {
                *sink.borrow_mut() = Some((bytes_arg(args, 0), str_arg(args, 2)));
                Ok(())
            });
            bridge
                .get_content("http://gbk.example/list", callback, FakeValue::str("data"), None)
                .map_err(to_script_error)
        });
        let client = ScriptedClient::new().respond(
            "http://gbk.example/list",
            HttpResponse::new(200, page).with_content_type("text/html; charset=gb2312"),
        );
        let mut h = harness(client, vec![("plugin_gbk", FakeModule::plugin(&[]).with("search", search))]);

        h.manager.search("gbk", "kw", 1).unwrap();
        h.manager.run_until_idle().await;

        let (body, charset) = received.borrow_mut().take().unwrap();
        assert_eq!(&body[..], page);
        assert_eq!(charset, "gb2312");
        assert_eq!(decode_text(&body, Some(&charset)).unwrap(), "中文");
    }

    #[tokio::test]
    async fn test_unknown_host_and_name() {
        let mut h = harness(ScriptedClient::new(), vec![("plugin_a", FakeModule::plugin(&["a.example"]))]);

        let err = h.manager.parse_url("http://c.example/x", false).unwrap_err();
        assert!(matches!(err, ScoutError::PluginNotFound(_)));
        let err = h.manager.parse_url("not a url", false).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidArgument(_)));
        let err = h.manager.search("nope", "kw", 1).unwrap_err();
        assert!(matches!(err, ScoutError::PluginNotFound(_)));
    }

    #[tokio::test]
    async fn test_search_album_requires_entry_point() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = calls.clone();
        let album = FakeValue::function(move |_, args| {
            seen.borrow_mut().push((str_arg(args, 0), int_arg(args, 1)));
            Ok(())
        });
        let mut h = harness(
            ScriptedClient::new(),
            vec![
                ("plugin_plain", FakeModule::plugin(&[])),
                ("plugin_albums", FakeModule::plugin(&[]).with("search_album", album)),
            ],
        );

        let err = h.manager.search_album("plain", "kw", 1).unwrap_err();
        assert_eq!(err.error_type(), "ArgumentError");
        h.manager.search_album("albums", "kw", 3).unwrap();
        assert_eq!(*calls.borrow(), vec![("kw".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_rejected() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let seen = errors.clone();
        let search = FakeValue::function(move |bridge, _| {
            bridge
                .get_content("http://x/1", finish_with_body(), FakeValue::str("first"), None)
                .map_err(to_script_error)?;
            if let Err(e) = bridge.get_content("http://x/2", finish_with_body(), FakeValue::str("second"), None) {
                seen.borrow_mut().push(e.error_type());
            }
            Ok(())
        });
        let client = ScriptedClient::new()
            .respond("http://x/1", HttpResponse::new(200, "one"))
            .respond("http://x/2", HttpResponse::new(200, "two"));
        let calls = client.calls();
        let mut h = harness(client, vec![("plugin_s", FakeModule::plugin(&[]).with("search", search))]);

        h.manager.search("s", "kw", 1).unwrap();
        h.manager.run_until_idle().await;

        assert_eq!(*errors.borrow(), vec!["ConcurrentTaskError"]);
        let parsed = h.recorder.parsed();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["tag"], json!("first"));
        assert_eq!(*calls.lock().unwrap(), vec!["GET http://x/1".to_string()]);
    }

    #[tokio::test]
    async fn test_network_error_skips_callback() {
        let data = FakeValue::str("data");
        let held = data.clone();
        let invoked = Rc::new(RefCell::new(false));
        let flag = invoked.clone();
        let search = FakeValue::function(move |bridge, _| {
            let flag = flag.clone();
            let callback = FakeValue::function(move |_, _| {
                *flag.borrow_mut() = true;
                Ok(())
            });
            bridge
                .get_content("http://x/down", callback, held.clone(), None)
                .map_err(to_script_error)
        });
        let client = ScriptedClient::new().respond("http://x/down", HttpResponse::new(503, ""));
        let mut h = harness(client, vec![("plugin_s", FakeModule::plugin(&[]).with("search", search))]);

        h.manager.search("s", "kw", 1).unwrap();
        assert_eq!(Rc::strong_count(&data), 3);
        h.manager.run_until_idle().await;

        assert!(!*invoked.borrow());
        assert!(!h.manager.is_busy());
        // only the test and the plugin closure hold it now
        assert_eq!(Rc::strong_count(&data), 2);
        let warnings = h.recorder.warnings();
        assert_eq!(warnings[0].0, "Error");
        assert!(warnings[0].1.starts_with("Network Error: 503\n"));
    }

    #[tokio::test]
    async fn test_callback_error_does_not_stop_loop() {
        let search = FakeValue::function(|bridge, _| {
            let failing = FakeValue::function(|bridge, _| {
                // the slot is free again inside the callback
                bridge
                    .get_content("http://x/2", finish_with_body(), FakeValue::str("second"), None)
                    .map_err(to_script_error)?;
                Err(ScriptError::Exception("TypeError: boom".to_string()))
            });
            bridge
                .get_content("http://x/1", failing, FakeValue::str("first"), None)
                .map_err(to_script_error)
        });
        let client = ScriptedClient::new()
            .respond("http://x/1", HttpResponse::new(200, "one"))
            .respond("http://x/2", HttpResponse::new(200, "two"));
        let mut h = harness(client, vec![("plugin_s", FakeModule::plugin(&[]).with("search", search))]);

        h.manager.search("s", "kw", 1).unwrap();
        h.manager.run_until_idle().await;

        let parsed = h.recorder.parsed();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["body"], json!("two"));
        assert!(!h.manager.is_busy());
    }

    #[tokio::test]
    async fn test_hints_shared_with_bridge() {
        let parse = FakeValue::function(|bridge, args| {
            bridge.bind_referer("cdn.example", &str_arg(args, 0));
            bridge.force_unseekable("cdn.example");
            Ok(())
        });
        let mut h = harness(
            ScriptedClient::new(),
            vec![("plugin_v", FakeModule::plugin(&["v.example"]).with("parse", parse))],
        );

        h.manager.parse_with("v", "http://v.example/1", true).unwrap();
        assert_eq!(
            h.manager.hints().referer_for("cdn.example").as_deref(),
            Some("http://v.example/1")
        );
        assert!(h.manager.hints().is_unseekable("cdn.example"));
        assert_eq!(h.manager.registry().len(), 1);
    }
}
