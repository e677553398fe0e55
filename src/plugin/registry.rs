//! Plugin registry implementation
//!
//! This module discovers plugin files on disk, loads one [`Plugin`] per
//! `plugin_<name>.<ext>` file and maintains the host and name routing tables.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, error, info};

use super::script::ScriptRuntime;
use super::types::{module_id_of, Plugin, PLUGIN_PREFIX, RESOURCE_PREFIX};
use crate::core::error::{Result, ScoutError};

/// Plugin and resource files found in one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryInventory {
    pub dir: PathBuf,
    pub exists: bool,
    /// `plugin_*` files, sorted by name
    pub plugins: Vec<PathBuf>,
    /// `res_*` files, sorted by name
    pub resources: Vec<PathBuf>,
}

impl DirectoryInventory {
    /// Scan `dir` for files with the given extension
    ///
    /// A missing directory yields an empty inventory.
    pub fn scan(dir: &Path, extension: &str) -> io::Result<Self> {
        let mut inventory = Self {
            dir: dir.to_path_buf(),
            ..Default::default()
        };

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "plugin directory does not exist");
                return Ok(inventory);
            }
            Err(e) => return Err(e),
        };
        inventory.exists = true;

        let suffix = format!(".{}", extension);
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(&suffix) {
                files.push((name, entry.path()));
            }
        }
        files.sort();

        for (name, path) in files {
            if name.starts_with(PLUGIN_PREFIX) {
                inventory.plugins.push(path);
            } else if name.starts_with(RESOURCE_PREFIX) {
                inventory.resources.push(path);
            }
        }
        Ok(inventory)
    }

    /// Plugin and resource file names in name order
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .iter()
            .chain(&self.resources)
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

/// What discovery found, directory by directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginInventory {
    pub directories: Vec<DirectoryInventory>,
}

impl PluginInventory {
    pub fn scan(dirs: &[PathBuf], extension: &str) -> io::Result<Self> {
        let directories = dirs
            .iter()
            .map(|dir| DirectoryInventory::scan(dir, extension))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { directories })
    }

    /// Plugin files in load order
    pub fn plugin_files(&self) -> impl Iterator<Item = &Path> {
        self.directories
            .iter()
            .flat_map(|d| d.plugins.iter().map(PathBuf::as_path))
    }

    pub fn plugin_count(&self) -> usize {
        self.directories.iter().map(|d| d.plugins.len()).sum()
    }

    pub fn resource_count(&self) -> usize {
        self.directories.iter().map(|d| d.resources.len()).sum()
    }
}

impl fmt::Display for PluginInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dir) in self.directories.iter().enumerate() {
            let heading = match i {
                0 => "System plugins".to_string(),
                1 => "Plugins installed by user".to_string(),
                _ => format!("Plugins in {}", dir.dir.display()),
            };
            writeln!(f, "{}:", heading)?;
            for name in dir.file_names() {
                writeln!(f, "    {}", name)?;
            }
        }
        Ok(())
    }
}

/// Plugin registry
///
/// Host and name tables map to shared plugins. A later registration for the
/// same key replaces the earlier one.
pub struct PluginRegistry<H> {
    plugins: Vec<Rc<Plugin<H>>>,
    by_host: HashMap<String, Rc<Plugin<H>>>,
    by_name: HashMap<String, Rc<Plugin<H>>>,
}

impl<H> Default for PluginRegistry<H> {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
            by_host: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<H: Clone> PluginRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every plugin found in `dirs`
    ///
    /// # Arguments
    /// * `runtime` - Engine that evaluates the plugin files
    /// * `dirs` - Directories in load order; later ones override earlier ones
    /// * `extension` - Plugin file extension without the dot
    ///
    /// # Errors
    /// Any plugin that fails to load aborts discovery. Plugins loaded before
    /// the failure stay registered, but callers are expected to give up.
    pub fn discover<R>(&mut self, runtime: &mut R, dirs: &[PathBuf], extension: &str) -> Result<PluginInventory>
    where
        R: ScriptRuntime<Handle = H>,
    {
        let inventory = PluginInventory::scan(dirs, extension)?;
        info!(
            plugins = inventory.plugin_count(),
            resources = inventory.resource_count(),
            "plugin files discovered"
        );

        for path in inventory.plugin_files() {
            let module_id = module_id_of(path).ok_or_else(|| {
                ScoutError::PluginLoadError(format!("invalid plugin file name: {}", path.display()))
            })?;
            let plugin = Plugin::load(runtime, module_id, path).map_err(|e| {
                error!(path = %path.display(), error = %e, "failed to load plugin");
                ScoutError::from(e)
            })?;
            self.register(plugin);
        }

        info!(loaded = self.plugins.len(), hosts = self.by_host.len(), "plugins loaded");
        Ok(inventory)
    }
}

impl<H> PluginRegistry<H> {
    /// Add a plugin to the routing tables
    pub fn register(&mut self, plugin: Plugin<H>) -> Rc<Plugin<H>> {
        let plugin = Rc::new(plugin);
        for host in plugin.hosts() {
            if let Some(previous) = self.by_host.insert(host.clone(), Rc::clone(&plugin)) {
                info!(host = %host, from = %previous.name(), to = %plugin.name(), "host taken over");
            }
        }
        if self.by_name.insert(plugin.name().to_string(), Rc::clone(&plugin)).is_some() {
            info!(name = %plugin.name(), "plugin name taken over");
        }
        debug!(name = %plugin.name(), hosts = ?plugin.hosts(), "plugin registered");
        self.plugins.push(Rc::clone(&plugin));
        plugin
    }

    pub fn lookup_by_host(&self, host: &str) -> Option<Rc<Plugin<H>>> {
        self.by_host.get(host).cloned()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Rc<Plugin<H>>> {
        self.by_name.get(name).cloned()
    }

    /// Plugins in load order
    pub fn plugins(&self) -> impl Iterator<Item = &Plugin<H>> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// Host routing table sorted by host
    pub fn hosts(&self) -> Vec<(&str, &str)> {
        let mut hosts: Vec<(&str, &str)> = self
            .by_host
            .iter()
            .map(|(host, plugin)| (host.as_str(), plugin.name()))
            .collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
