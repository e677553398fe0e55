//! Per-host stream hints published by plugins
//!
//! Plugins bind a default referer to a host and flag hosts whose streams
//! cannot be seeked. Only the bridge writes these tables; the playback and
//! download layers read them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
struct HintTables {
    referers: HashMap<String, String>,
    /// Insertion ordered, no duplicates
    unseekable: Vec<String>,
}

/// Shared handle to the hint tables
#[derive(Debug, Clone, Default)]
pub struct StreamHints {
    inner: Arc<RwLock<HintTables>>,
}

impl StreamHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind_referer(&self, host: &str, url: &str) {
        let mut tables = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tables.referers.insert(host.to_string(), url.to_string());
    }

    /// Returns false when the host was already flagged
    pub(crate) fn mark_unseekable(&self, host: &str) -> bool {
        let mut tables = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if tables.unseekable.iter().any(|h| h == host) {
            return false;
        }
        tables.unseekable.push(host.to_string());
        true
    }

    pub fn referer_for(&self, host: &str) -> Option<String> {
        let tables = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        tables.referers.get(host).cloned()
    }

    pub fn is_unseekable(&self, host: &str) -> bool {
        let tables = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        tables.unseekable.iter().any(|h| h == host)
    }

    pub fn unseekable_hosts(&self) -> Vec<String> {
        let tables = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        tables.unseekable.clone()
    }

    /// Snapshot of the referer table
    pub fn referers(&self) -> HashMap<String, String> {
        let tables = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        tables.referers.clone()
    }
}
