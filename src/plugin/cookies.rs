//! Session cookies shared with downstream collaborators
//!
//! The HTTP client stores every cookie the sites set in one jar. Players and
//! downloaders reuse a plugin's session by reading the cookies for a stream
//! URL, usually as a Netscape cookie file.

use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use tracing::debug;
use url::Url;

use crate::core::error::Result;

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File\n\
                               # This is a generated file!  Do not edit.\n\n";

/// Cookie jar behind [`ReqwestClient`](super::http::ReqwestClient)
#[derive(Debug, Clone, Default)]
pub struct SessionCookies {
    jar: Arc<Jar>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Record a `Set-Cookie` value as if `url` had sent it
    pub fn add(&self, set_cookie: &str, url: &Url) {
        self.jar.add_cookie_str(set_cookie, url);
    }

    /// Name and value of every cookie a request to `url` would carry
    pub fn cookies_for(&self, url: &Url) -> Vec<(String, String)> {
        let Some(header) = self.jar.cookies(url) else {
            return Vec::new();
        };
        let Ok(header) = header.to_str() else {
            return Vec::new();
        };
        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Netscape cookie file for `url`, `None` when no cookie applies
    pub fn to_netscape(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for(url);
        if cookies.is_empty() {
            return None;
        }

        let domain = url.host_str().unwrap_or_default();
        let secure = if url.scheme() == "https" { "TRUE" } else { "FALSE" };
        let mut content = String::from(NETSCAPE_HEADER);
        for (name, value) in cookies {
            // session cookies: expiry 0
            content.push_str(&format!("{}\tTRUE\t/\t{}\t0\t{}\t{}\n", domain, secure, name, value));
        }
        Some(content)
    }

    /// Write the cookies for `url` to `path`
    ///
    /// Returns false, leaving `path` untouched, when no cookie applies.
    pub fn save(&self, url: &Url, path: &Path) -> Result<bool> {
        let Some(content) = self.to_netscape(url) else {
            debug!(url = %url, "no cookies to save");
            return Ok(false);
        };
        std::fs::write(path, content)?;
        debug!(url = %url, path = %path.display(), "cookies saved");
        Ok(true)
    }
}
