//! In-memory collaborators for unit tests
//!
//! [`ScriptedClient`] answers requests from a routing table. [`FakeRuntime`]
//! stands in for the JavaScript engine: modules are built from Rust closures
//! and handles are plain `Rc`s, so tests can observe reference counts.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::bridge::Bridge;
use super::fetch::{FetchEvent, FetchTask};
use super::frontend::{Frontend, ParseSink, Record, ResultItem, ResultView, UserInterface};
use super::hints::StreamHints;
use super::http::{HttpRequest, HttpResponse, NetworkClient, NetworkError};
use super::script::{ScriptArg, ScriptError, ScriptRuntime};

enum Route {
    Respond(HttpResponse),
    Hang,
}

/// Network client answering from a fixed table keyed by URL
#[derive(Clone, Default)]
pub(crate) struct ScriptedClient {
    routes: Arc<Mutex<HashMap<String, Arc<Route>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, response: HttpResponse) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Route::Respond(response)));
        self
    }

    /// Never answer requests for `url`
    pub fn hang(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), Arc::new(Route::Hang));
        self
    }

    /// `"METHOD url"` for every request seen
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<HttpRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl NetworkClient for ScriptedClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(format!("{} {}", request.method, url));
        self.requests.lock().unwrap().push(request);

        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route.as_deref() {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Hang) => std::future::pending().await,
            None => Err(NetworkError::Transport(format!("no route to {}", url))),
        }
    }
}

/// Front end that records everything it is shown
#[derive(Default)]
pub(crate) struct RecordingFrontend {
    answer: Cell<bool>,
    warnings: RefCell<Vec<(String, String)>>,
    questions: RefCell<Vec<String>>,
    clears: Cell<usize>,
    items: RefCell<Vec<ResultItem>>,
    details: RefCell<Vec<Record>>,
    parsed: RefCell<Vec<Record>>,
}

impl RecordingFrontend {
    pub fn answer(&self, yes: bool) {
        self.answer.set(yes);
    }

    pub fn warnings(&self) -> Vec<(String, String)> {
        self.warnings.borrow().clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.get()
    }

    pub fn items(&self) -> Vec<ResultItem> {
        self.items.borrow().clone()
    }

    pub fn details(&self) -> Vec<Record> {
        self.details.borrow().clone()
    }

    pub fn parsed(&self) -> Vec<Record> {
        self.parsed.borrow().clone()
    }
}

impl UserInterface for RecordingFrontend {
    fn warn(&self, title: &str, message: &str) {
        self.warnings.borrow_mut().push((title.to_string(), message.to_string()));
    }

    fn confirm(&self, message: &str) -> bool {
        self.questions.borrow_mut().push(message.to_string());
        self.answer.get()
    }
}

impl ResultView for RecordingFrontend {
    fn clear(&self) {
        self.clears.set(self.clears.get() + 1);
        self.items.borrow_mut().clear();
    }

    fn add_item(&self, item: ResultItem) {
        self.items.borrow_mut().push(item);
    }

    fn open_detail(&self, record: Record) {
        self.details.borrow_mut().push(record);
    }
}

impl ParseSink for RecordingFrontend {
    fn parse_finished(&self, record: Record) {
        self.parsed.borrow_mut().push(record);
    }
}

pub(crate) type FakeHandle = Rc<FakeValue>;

type FakeFn = Rc<dyn Fn(&mut Bridge<FakeHandle>, &[ScriptArg<FakeHandle>]) -> Result<(), ScriptError>>;

/// A value living in the fake engine
pub(crate) enum FakeValue {
    Null,
    Str(String),
    List(Vec<FakeHandle>),
    Object(HashMap<String, FakeHandle>),
    Function(FakeFn),
}

impl fmt::Debug for FakeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FakeValue::Null => write!(f, "null"),
            FakeValue::Str(s) => write!(f, "{:?}", s),
            FakeValue::List(items) => f.debug_list().entries(items).finish(),
            FakeValue::Object(map) => f.debug_map().entries(map).finish(),
            FakeValue::Function(_) => write!(f, "[function]"),
        }
    }
}

impl FakeValue {
    pub fn str(s: &str) -> FakeHandle {
        Rc::new(FakeValue::Str(s.to_string()))
    }

    pub fn hosts(hosts: &[&str]) -> FakeHandle {
        Rc::new(FakeValue::List(hosts.iter().map(|h| FakeValue::str(h)).collect()))
    }

    pub fn function<F>(f: F) -> FakeHandle
    where
        F: Fn(&mut Bridge<FakeHandle>, &[ScriptArg<FakeHandle>]) -> Result<(), ScriptError> + 'static,
    {
        Rc::new(FakeValue::Function(Rc::new(f)))
    }

    /// A function that does nothing
    pub fn noop() -> FakeHandle {
        Self::function(|_, _| Ok(()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FakeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Builder for fake plugin modules
#[derive(Default)]
pub(crate) struct FakeModule {
    attrs: HashMap<String, FakeHandle>,
}

impl FakeModule {
    /// A module with no-op `parse` and `search` serving `hosts`
    pub fn plugin(hosts: &[&str]) -> Self {
        Self::default()
            .with("hosts", FakeValue::hosts(hosts))
            .with("parse", FakeValue::noop())
            .with("search", FakeValue::noop())
    }

    pub fn with(mut self, name: &str, value: FakeHandle) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.attrs.remove(name);
        self
    }

    pub fn build(self) -> FakeHandle {
        Rc::new(FakeValue::Object(self.attrs))
    }
}

/// Scripting engine double driven entirely from Rust
pub(crate) struct FakeRuntime {
    bridge: Bridge<FakeHandle>,
    modules: HashMap<String, FakeHandle>,
    loaded: Vec<String>,
}

impl FakeRuntime {
    pub fn new(bridge: Bridge<FakeHandle>) -> Self {
        Self {
            bridge,
            modules: HashMap::new(),
            loaded: Vec::new(),
        }
    }

    pub fn install(&mut self, module_id: &str, module: FakeModule) {
        self.modules.insert(module_id.to_string(), module.build());
    }

    pub fn with_module(mut self, module_id: &str, module: FakeModule) -> Self {
        self.install(module_id, module);
        self
    }

    /// Module ids in load order
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }
}

impl ScriptRuntime for FakeRuntime {
    type Handle = FakeHandle;

    fn load_module(&mut self, module_id: &str, _path: &Path) -> Result<FakeHandle, ScriptError> {
        let module = self
            .modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| ScriptError::ModuleNotFound(module_id.to_string()))?;
        self.loaded.push(module_id.to_string());
        Ok(module)
    }

    fn attribute(&mut self, object: &FakeHandle, name: &str) -> Result<Option<FakeHandle>, ScriptError> {
        match &**object {
            FakeValue::Object(attrs) => Ok(attrs
                .get(name)
                .filter(|v| !matches!(***v, FakeValue::Null))
                .cloned()),
            other => Err(ScriptError::Type(format!("{:?} has no attributes", other))),
        }
    }

    fn is_callable(&mut self, value: &FakeHandle) -> bool {
        matches!(**value, FakeValue::Function(_))
    }

    fn string_list(&mut self, value: &FakeHandle) -> Result<Vec<String>, ScriptError> {
        match &**value {
            FakeValue::List(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ScriptError::Type(format!("{:?} is not a string", item)))
                })
                .collect(),
            other => Err(ScriptError::Type(format!("{:?} is not a list", other))),
        }
    }

    fn call(&mut self, function: &FakeHandle, args: Vec<ScriptArg<FakeHandle>>) -> Result<(), ScriptError> {
        let f = match &**function {
            FakeValue::Function(f) => Rc::clone(f),
            other => return Err(ScriptError::Type(format!("{:?} is not a function", other))),
        };
        f(&mut self.bridge, &args)
    }

    fn with_bridge<T>(&mut self, f: impl FnOnce(&mut Bridge<FakeHandle>) -> T) -> T {
        f(&mut self.bridge)
    }
}

/// Pull the string argument at `index`
pub(crate) fn str_arg(args: &[ScriptArg<FakeHandle>], index: usize) -> String {
    match args.get(index) {
        Some(ScriptArg::Str(s)) => s.clone(),
        Some(ScriptArg::Value(v)) => v.as_str().unwrap_or_default().to_string(),
        other => panic!("argument {} is not a string: {:?}", index, other),
    }
}

/// Pull the byte argument at `index`
pub(crate) fn bytes_arg(args: &[ScriptArg<FakeHandle>], index: usize) -> Bytes {
    match args.get(index) {
        Some(ScriptArg::Bytes(bytes)) => bytes.clone(),
        other => panic!("argument {} is not bytes: {:?}", index, other),
    }
}

/// Pull the integer argument at `index`
pub(crate) fn int_arg(args: &[ScriptArg<FakeHandle>], index: usize) -> i64 {
    match args.get(index) {
        Some(ScriptArg::Int(n)) => *n,
        other => panic!("argument {} is not an integer: {:?}", index, other),
    }
}

/// Bridge wired to `client` and a recording front end
pub(crate) fn fake_bridge(
    client: ScriptedClient,
) -> (Bridge<FakeHandle>, Rc<RecordingFrontend>, mpsc::UnboundedReceiver<FetchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = Rc::new(RecordingFrontend::default());
    let bridge = Bridge::new(
        FetchTask::new(Arc::new(client), tx),
        StreamHints::new(),
        Frontend::shared(recorder.clone()),
    );
    (bridge, recorder, rx)
}

/// Fake runtime for tests that never drive the event loop
pub(crate) fn fake_runtime(client: ScriptedClient) -> FakeRuntime {
    let (bridge, _, _) = fake_bridge(client);
    FakeRuntime::new(bridge)
}
