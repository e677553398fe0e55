//! Single-flight asynchronous fetch task
//!
//! At most one HTTP exchange is outstanding at a time. The task moves through
//! `Idle -> Requesting -> Redirecting* -> Completed | Failed -> Idle`, where
//! each `Redirecting` step is one followed 301/302 hop still in flight.
//!
//! The exchange itself runs on the tokio runtime. Its result comes back as a
//! [`FetchEvent`] on an mpsc channel, and the owner of the receiving end feeds
//! it to [`FetchTask::on_event`] on a later turn of its event loop. Each event
//! carries the id of the exchange that produced it, so results of aborted or
//! superseded exchanges are recognised and dropped.
//!
//! The callback and user data handed over by the script are held in a
//! [`Continuation`] for the whole life of the task, redirects included. It
//! leaves the task exactly once: moved out to the caller on success, or
//! dropped on failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{HttpRequest, HttpResponse, NetworkClient, NetworkError};
use crate::core::error::{Result, ScoutError};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: usize = 16;

/// Foreign callback and its user data, owned by an outstanding fetch
#[derive(Debug)]
pub struct Continuation<H> {
    pub callback: H,
    pub data: H,
}

impl<H> Continuation<H> {
    pub fn new(callback: H, data: H) -> Self {
        Self { callback, data }
    }
}

/// What a script asked to fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub referer: Option<String>,
    /// Form-encoded POST payload. Absent or empty means GET.
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }
}

/// Completion of one exchange
#[derive(Debug)]
pub struct FetchEvent {
    exchange: u64,
    result: std::result::Result<HttpResponse, NetworkError>,
}

impl FetchEvent {
    pub fn exchange(&self) -> u64 {
        self.exchange
    }
}

/// Observable phase of the task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    /// Waiting for the reply to the URL the script asked for
    Requesting,
    /// Waiting for the reply to a redirect target
    Redirecting,
}

/// Result of feeding one event to the task
#[derive(Debug)]
pub enum FetchOutcome<H> {
    /// A 301/302 was followed; the task is redirecting
    Redirected { location: String },
    /// The task is idle again and hands back its continuation
    Completed {
        final_url: String,
        body: Bytes,
        /// Charset from the final response's `Content-Type`
        charset: Option<String>,
        continuation: Continuation<H>,
    },
    /// The task is idle again; the continuation has been released
    Failed { url: String, error: NetworkError },
    /// The event belonged to an exchange that is no longer current
    Stale,
}

/// Aborts the spawned exchange when dropped
struct Exchange {
    id: u64,
    handle: JoinHandle<()>,
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct InFlight<H> {
    continuation: Continuation<H>,
    exchange: Exchange,
    url: Url,
    referer: Option<String>,
    redirects: usize,
}

enum FetchState<H> {
    Idle,
    Requesting(InFlight<H>),
    Redirecting(InFlight<H>),
}

pub struct FetchTask<H> {
    client: Arc<dyn NetworkClient>,
    events: mpsc::UnboundedSender<FetchEvent>,
    timeout: Duration,
    max_redirects: usize,
    state: FetchState<H>,
    final_url: String,
    next_exchange: u64,
}

impl<H> FetchTask<H> {
    pub fn new(client: Arc<dyn NetworkClient>, events: mpsc::UnboundedSender<FetchEvent>) -> Self {
        Self {
            client,
            events,
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            state: FetchState::Idle,
            final_url: String::new(),
            next_exchange: 1,
        }
    }

    /// Timeout applied to each hop of a request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn phase(&self) -> FetchPhase {
        match self.state {
            FetchState::Idle => FetchPhase::Idle,
            FetchState::Requesting(_) => FetchPhase::Requesting,
            FetchState::Redirecting(_) => FetchPhase::Redirecting,
        }
    }

    /// Whether a continuation is currently held
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, FetchState::Idle)
    }

    /// Last URL requested, updated on every redirect hop
    pub fn final_url(&self) -> &str {
        &self.final_url
    }

    /// Start a fetch and take ownership of `continuation`
    ///
    /// Fails with [`ScoutError::TaskInProgress`] while another fetch is
    /// outstanding. No exchange is started in that case and the rejected
    /// continuation is released on return.
    pub fn start(&mut self, request: FetchRequest, continuation: Continuation<H>) -> Result<()> {
        if self.is_busy() {
            warn!(url = %request.url, "fetch rejected: another task is running");
            return Err(ScoutError::TaskInProgress);
        }

        let url = Url::parse(&request.url)
            .map_err(|e| ScoutError::InvalidArgument(format!("invalid url '{}': {}", request.url, e)))?;
        let referer = request.referer.filter(|r| !r.is_empty());

        let http_request = match request.body.filter(|b| !b.is_empty()) {
            Some(body) => HttpRequest::post(url.clone(), body),
            None => HttpRequest::get(url.clone()),
        }
        .with_referer(referer.clone());

        info!(method = %http_request.method, url = %url, "fetch started");
        let exchange = self.dispatch(http_request);
        self.final_url = request.url;
        self.state = FetchState::Requesting(InFlight {
            continuation,
            exchange,
            url,
            referer,
            redirects: 0,
        });
        Ok(())
    }

    /// Advance the state machine with the completion of an exchange
    pub fn on_event(&mut self, event: FetchEvent) -> FetchOutcome<H> {
        let inflight = match std::mem::replace(&mut self.state, FetchState::Idle) {
            FetchState::Requesting(inflight) | FetchState::Redirecting(inflight)
                if inflight.exchange.id == event.exchange =>
            {
                inflight
            }
            other => {
                debug!(exchange = event.exchange, "ignoring stale fetch event");
                self.state = other;
                return FetchOutcome::Stale;
            }
        };

        match event.result {
            Ok(resp) if resp.is_redirect() => self.follow_redirect(inflight, resp.location),
            Ok(resp) if resp.is_error() => Self::fail(inflight, NetworkError::from_status(resp.status)),
            Ok(resp) => {
                info!(url = %inflight.url, status = resp.status, len = resp.body.len(), "fetch completed");
                let charset = resp.charset();
                let InFlight { continuation, .. } = inflight;
                FetchOutcome::Completed {
                    final_url: self.final_url.clone(),
                    body: resp.body,
                    charset,
                    continuation,
                }
            }
            Err(error) => Self::fail(inflight, error),
        }
    }

    fn follow_redirect(&mut self, mut inflight: InFlight<H>, location: Option<String>) -> FetchOutcome<H> {
        if inflight.redirects >= self.max_redirects {
            return Self::fail(inflight, NetworkError::TooManyRedirects(self.max_redirects));
        }
        let Some(location) = location else {
            return Self::fail(inflight, NetworkError::MissingLocation);
        };
        let target = match inflight.url.join(&location) {
            Ok(target) => target,
            Err(_) => return Self::fail(inflight, NetworkError::BadLocation(location)),
        };

        debug!(from = %inflight.url, to = %target, hop = inflight.redirects + 1, "following redirect");
        self.final_url = target.to_string();
        inflight.redirects += 1;
        inflight.url = target.clone();
        // the previous exchange already delivered its event
        inflight.exchange = self.dispatch(HttpRequest::get(target).with_referer(inflight.referer.clone()));
        self.state = FetchState::Redirecting(inflight);
        FetchOutcome::Redirected { location: self.final_url.clone() }
    }

    fn fail(inflight: InFlight<H>, error: NetworkError) -> FetchOutcome<H> {
        let url = inflight.url.to_string();
        warn!(url = %url, error = %error, "fetch failed");
        drop(inflight);
        FetchOutcome::Failed { url, error }
    }

    fn dispatch(&mut self, request: HttpRequest) -> Exchange {
        let id = self.next_exchange;
        self.next_exchange += 1;

        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let timeout = self.timeout;
        debug!(exchange = id, method = %request.method, url = %request.url, "dispatching exchange");

        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, client.execute(request)).await {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Timeout(timeout)),
            };
            // the receiver is gone only when the host is shutting down
            let _ = events.send(FetchEvent { exchange: id, result });
        });
        Exchange { id, handle }
    }
}
