//! Plugin type definitions
//!
//! A [`Plugin`] is a loaded script module together with its resolved entry
//! points and declared hosts. Entry points are resolved once at load time;
//! calling one later never has to look it up again.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::script::{ScriptArg, ScriptError, ScriptRuntime};
use crate::core::config::Quality;
use crate::core::error::ScoutError;

/// Filename prefix of loadable plugins
pub const PLUGIN_PREFIX: &str = "plugin_";

/// Filename prefix of inventory-only resource scripts
pub const RESOURCE_PREFIX: &str = "res_";

/// Option flags passed to a plugin's `parse`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions(u32);

impl ParseOptions {
    pub const QL_HIGH: u32 = 1;
    pub const QL_SUPER: u32 = 2;
    pub const DOWNLOAD: u32 = 4;

    pub fn new(quality: Quality, download: bool) -> Self {
        let mut bits = match quality {
            Quality::Super => Self::QL_SUPER,
            Quality::High => Self::QL_HIGH,
            Quality::Normal => 0,
        };
        if download {
            bits |= Self::DOWNLOAD;
        }
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_download(self) -> bool {
        self.0 & Self::DOWNLOAD != 0
    }
}

/// Why a plugin could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("plugin module {0} not found")]
    ModuleNotFound(String),

    #[error("failed to evaluate plugin {module}: {source}")]
    Script {
        module: String,
        #[source]
        source: ScriptError,
    },

    #[error("plugin {module} does not define '{entry}'")]
    MissingEntryPoint { module: String, entry: &'static str },

    #[error("'{entry}' in plugin {module} is not a function")]
    NotCallable { module: String, entry: &'static str },

    #[error("invalid hosts in plugin {module}: {message}")]
    InvalidHosts { module: String, message: String },
}

impl From<LoadError> for ScoutError {
    fn from(err: LoadError) -> Self {
        ScoutError::PluginLoadError(err.to_string())
    }
}

impl From<ScriptError> for ScoutError {
    fn from(err: ScriptError) -> Self {
        ScoutError::PluginExecutionError(err.to_string())
    }
}

/// Module id of a plugin file: its file name up to the first `.`
pub fn module_id_of(path: &Path) -> Option<&str> {
    let file_name = path.file_name()?.to_str()?;
    file_name.split('.').next().filter(|id| !id.is_empty())
}

/// Display name of a module: the id without its leading `<prefix>_`
pub fn plugin_name_of(module_id: &str) -> &str {
    module_id.split_once('_').map(|(_, name)| name).unwrap_or(module_id)
}

/// Serializable summary of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub module_id: String,
    pub path: PathBuf,
    pub hosts: Vec<String>,
    pub search_album: bool,
}

/// A loaded plugin
#[derive(Debug)]
pub struct Plugin<H> {
    module_id: String,
    name: String,
    path: PathBuf,
    /// Keeps the module alive for the life of the process
    #[allow(dead_code)]
    module: H,
    parse: H,
    search: H,
    search_album: Option<H>,
    hosts: Vec<String>,
}

impl<H: Clone> Plugin<H> {
    /// Evaluate `path` and resolve the module contract
    pub fn load<R>(runtime: &mut R, module_id: &str, path: &Path) -> Result<Self, LoadError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        debug!(module = module_id, path = %path.display(), "loading plugin module");
        let module = runtime.load_module(module_id, path).map_err(|e| match e {
            ScriptError::ModuleNotFound(m) => LoadError::ModuleNotFound(m),
            source => LoadError::Script {
                module: module_id.to_string(),
                source,
            },
        })?;

        let parse = Self::entry_point(runtime, &module, module_id, "parse")?
            .ok_or_else(|| LoadError::MissingEntryPoint {
                module: module_id.to_string(),
                entry: "parse",
            })?;
        let search = Self::entry_point(runtime, &module, module_id, "search")?
            .ok_or_else(|| LoadError::MissingEntryPoint {
                module: module_id.to_string(),
                entry: "search",
            })?;
        let search_album = Self::entry_point(runtime, &module, module_id, "search_album")?;

        let hosts = match Self::attribute(runtime, &module, module_id, "hosts")? {
            Some(value) => runtime.string_list(&value).map_err(|e| LoadError::InvalidHosts {
                module: module_id.to_string(),
                message: e.to_string(),
            })?,
            None => Vec::new(),
        };

        Ok(Self {
            module_id: module_id.to_string(),
            name: plugin_name_of(module_id).to_string(),
            path: path.to_path_buf(),
            module,
            parse,
            search,
            search_album,
            hosts,
        })
    }

    fn attribute<R>(runtime: &mut R, module: &H, module_id: &str, name: &str) -> Result<Option<H>, LoadError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        runtime.attribute(module, name).map_err(|source| LoadError::Script {
            module: module_id.to_string(),
            source,
        })
    }

    fn entry_point<R>(
        runtime: &mut R,
        module: &H,
        module_id: &str,
        entry: &'static str,
    ) -> Result<Option<H>, LoadError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        match Self::attribute(runtime, module, module_id, entry)? {
            Some(value) if runtime.is_callable(&value) => Ok(Some(value)),
            Some(_) => Err(LoadError::NotCallable {
                module: module_id.to_string(),
                entry,
            }),
            None => Ok(None),
        }
    }

    /// Ask the plugin to resolve `url`
    ///
    /// Returns once the entry point has returned. The result arrives later
    /// through `finish_parsing`.
    pub fn parse<R>(&self, runtime: &mut R, url: &str, options: ParseOptions) -> Result<(), ScriptError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        debug!(plugin = %self.name, url, options = options.bits(), "calling parse");
        runtime.call(
            &self.parse,
            vec![ScriptArg::Str(url.to_string()), ScriptArg::Int(i64::from(options.bits()))],
        )
    }

    pub fn search<R>(&self, runtime: &mut R, keyword: &str, page: u32) -> Result<(), ScriptError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        debug!(plugin = %self.name, keyword, page, "calling search");
        runtime.call(&self.search, search_args(keyword, page))
    }

    /// Album search entry point, present only if the plugin defines one
    pub fn album_search(&self) -> Option<AlbumSearch<'_, H>> {
        self.search_album.as_ref().map(|function| AlbumSearch {
            plugin: &self.name,
            function,
        })
    }

    pub fn has_search_album(&self) -> bool {
        self.search_album.is_some()
    }
}

impl<H> Plugin<H> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            module_id: self.module_id.clone(),
            path: self.path.clone(),
            hosts: self.hosts.clone(),
            search_album: self.search_album.is_some(),
        }
    }
}

/// Borrowed `search_album` entry point
pub struct AlbumSearch<'a, H> {
    plugin: &'a str,
    function: &'a H,
}

impl<H: Clone> AlbumSearch<'_, H> {
    pub fn call<R>(&self, runtime: &mut R, keyword: &str, page: u32) -> Result<(), ScriptError>
    where
        R: ScriptRuntime<Handle = H>,
    {
        debug!(plugin = %self.plugin, keyword, page, "calling search_album");
        runtime.call(self.function, search_args(keyword, page))
    }
}

fn search_args<H>(keyword: &str, page: u32) -> Vec<ScriptArg<H>> {
    vec![ScriptArg::Str(keyword.to_string()), ScriptArg::Int(i64::from(page))]
}
