//! Host functions callable from plugin code
//!
//! A [`Bridge`] is installed in every scripting runtime. It owns the
//! single-flight [`FetchTask`], writes the [`StreamHints`] side tables and
//! forwards dialogs and results to the front end. Script engines translate
//! the [`ScoutError`]s returned here into script-side exceptions.

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info};

use super::fetch::{Continuation, FetchEvent, FetchOutcome, FetchRequest, FetchTask};
use super::frontend::{Frontend, Record, ResultItem};
use super::hints::StreamHints;
use crate::core::error::{Result, ScoutError};

/// A completed fetch ready to be handed to its callback
///
/// The body is passed on untouched; plugins decode it themselves.
#[derive(Debug)]
pub struct Delivery<H> {
    pub body: Bytes,
    pub charset: Option<String>,
    pub final_url: String,
    pub continuation: Continuation<H>,
}

pub struct Bridge<H> {
    fetch: FetchTask<H>,
    hints: StreamHints,
    frontend: Frontend,
}

impl<H> Bridge<H> {
    pub fn new(fetch: FetchTask<H>, hints: StreamHints, frontend: Frontend) -> Self {
        Self { fetch, hints, frontend }
    }

    /// Start a GET; `download_page` is the same call under its old name
    pub fn get_content(&mut self, url: &str, callback: H, data: H, referer: Option<String>) -> Result<()> {
        self.fetch.start(
            FetchRequest::get(url).with_referer(referer),
            Continuation::new(callback, data),
        )
    }

    pub fn post_content(
        &mut self,
        url: &str,
        body: &str,
        callback: H,
        data: H,
        referer: Option<String>,
    ) -> Result<()> {
        self.fetch.start(
            FetchRequest::post(url, body).with_referer(referer),
            Continuation::new(callback, data),
        )
    }

    pub fn bind_referer(&mut self, host: &str, url: &str) {
        debug!(host, url, "referer bound");
        self.hints.bind_referer(host, url);
    }

    pub fn force_unseekable(&mut self, host: &str) {
        if self.hints.mark_unseekable(host) {
            debug!(host, "host marked unseekable");
        }
    }

    pub fn warn(&self, message: &str) {
        self.frontend.ui.warn("Warning", message);
    }

    pub fn question(&self, message: &str) -> bool {
        self.frontend.ui.confirm(message)
    }

    /// Replace the result list with `items`
    ///
    /// Every record is checked before the view is touched, so a malformed
    /// listing leaves the previous results in place.
    pub fn res_show(&self, items: &Value) -> Result<usize> {
        let list = items
            .as_array()
            .ok_or_else(|| ScoutError::InvalidArgument("The argument is not a list.".to_string()))?;

        let items = list
            .iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<ResultItem>(item.clone())
                    .map_err(|e| ScoutError::InvalidArgument(format!("result #{}: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let count = items.len();
        self.frontend.results.clear();
        for item in items {
            self.frontend.results.add_item(item);
        }
        info!(count, "results shown");
        Ok(count)
    }

    pub fn show_detail(&self, record: Value) -> Result<()> {
        self.frontend.results.open_detail(as_record(record)?);
        Ok(())
    }

    pub fn finish_parsing(&self, record: Value) -> Result<()> {
        let record = as_record(record)?;
        info!(keys = record.len(), "parse finished");
        self.frontend.sink.parse_finished(record);
        Ok(())
    }

    /// URL of the last request, updated on every redirect hop
    pub fn final_url(&self) -> &str {
        self.fetch.final_url()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch.is_busy()
    }

    pub fn hints(&self) -> &StreamHints {
        &self.hints
    }

    /// Feed a completion event to the fetch task
    ///
    /// Network failures are reported to the user here and yield `None`; the
    /// continuation has already been released by then.
    pub fn handle_fetch_event(&mut self, event: FetchEvent) -> Option<Delivery<H>> {
        match self.fetch.on_event(event) {
            FetchOutcome::Completed { final_url, body, charset, continuation } => Some(Delivery {
                body,
                charset,
                final_url,
                continuation,
            }),
            FetchOutcome::Failed { error, .. } => {
                let message = format!("Network Error: {}\n{}\n", error.status(), error);
                self.frontend.ui.warn("Error", &message);
                None
            }
            FetchOutcome::Redirected { .. } | FetchOutcome::Stale => None,
        }
    }
}

fn as_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ScoutError::InvalidArgument("The argument is not an object.".to_string())),
    }
}
