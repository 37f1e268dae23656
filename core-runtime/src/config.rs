//! # Configuration Module
//!
//! Provides the TOML configuration for the document sync core.
//!
//! ## Overview
//!
//! An [`AppConfig`] holds the named sync routes and the settings shared by all
//! of them. A route binds a Markdown vault folder to a parent page in the
//! structured store and a folder in the HTML store; every sync call names the
//! route it runs on, or falls back to the configured default route.
//!
//! Configuration is a plain value. It is loaded once by the host and threaded
//! into the orchestrator and the media resolver explicitly.
//!
//! ## Usage
//!
//! ```no_run
//! use core_runtime::config::{AppConfig, RouteConfig};
//!
//! # fn main() -> core_runtime::Result<()> {
//! let path = AppConfig::default_path()?;
//! let mut config = AppConfig::load_or_default(&path)?;
//!
//! config.add_route(
//!     RouteConfig::new("notes", "/home/me/vault/notes")
//!         .with_structured_parent("page-123")
//!         .with_html_folder("folder-456"),
//! )?;
//! config.set_default_route("notes")?;
//! config.save(&path)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## File format
//!
//! ```toml
//! default_route = "notes"
//!
//! [sync]
//! max_concurrent_documents = 4
//! html_update_strategy = "replace"
//!
//! [logging]
//! format = "compact"
//! level = "info"
//!
//! [[routes]]
//! name = "notes"
//! source_root = "/home/me/vault/notes"
//! structured_parent = "page-123"
//! html_folder = "folder-456"
//! ```

use crate::error::{Error, Result};
use crate::logging::LoggingSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const CONFIG_DIR_NAME: &str = "docsync";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_CONCURRENT_DOCUMENTS: usize = 64;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Route used when a sync call does not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_route: Option<String>,
    /// Shared sync settings.
    pub sync: SyncSettings,
    /// Log output for hosts that call `init_logging`.
    pub logging: LoggingSettings,
    /// Configured routes, unique by name.
    pub routes: Vec<RouteConfig>,
}

impl AppConfig {
    /// Returns `<config dir>/docsync/config.toml` for the current user.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| Error::Config("No configuration directory on this platform".to_string()))
    }

    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&raw).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), routes = config.routes.len(), "Loaded configuration");
        Ok(config)
    }

    /// Reads a configuration file, or returns the default configuration if the
    /// file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validates and writes the configuration, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, raw)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Adds a route. Fails if a route with the same name exists.
    pub fn add_route(&mut self, route: RouteConfig) -> Result<()> {
        route.validate()?;
        if self.route(&route.name).is_some() {
            return Err(Error::Config(format!(
                "Route '{}' already exists",
                route.name
            )));
        }
        self.routes.push(route);
        Ok(())
    }

    /// Removes a route and returns it. Clears the default route when it
    /// pointed at the removed one.
    pub fn remove_route(&mut self, name: &str) -> Result<RouteConfig> {
        let index = self
            .routes
            .iter()
            .position(|route| route.name == name)
            .ok_or_else(|| Error::UnknownRoute(name.to_string()))?;

        if self.default_route.as_deref() == Some(name) {
            self.default_route = None;
        }
        Ok(self.routes.remove(index))
    }

    /// Looks up a route by name.
    pub fn route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// All configured routes in file order.
    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// Marks an existing route as the default.
    pub fn set_default_route(&mut self, name: &str) -> Result<()> {
        if self.route(name).is_none() {
            return Err(Error::Config(format!(
                "Cannot set default route: '{}' is not configured",
                name
            )));
        }
        self.default_route = Some(name.to_string());
        Ok(())
    }

    /// Resolves the route for a sync call: the named route if given, the
    /// default route otherwise.
    pub fn resolve_route(&self, name: Option<&str>) -> Result<&RouteConfig> {
        let name = match name.or(self.default_route.as_deref()) {
            Some(name) => name,
            None => {
                return Err(Error::Config(
                    "No route given and no default route configured".to_string(),
                ))
            }
        };
        self.route(name)
            .ok_or_else(|| Error::UnknownRoute(name.to_string()))
    }

    /// Validates routes, route name uniqueness, the default route, the sync
    /// settings and the logging section.
    pub fn validate(&self) -> Result<()> {
        for (index, route) in self.routes.iter().enumerate() {
            route.validate()?;
            if self.routes[..index].iter().any(|r| r.name == route.name) {
                return Err(Error::Config(format!(
                    "Route '{}' is defined more than once",
                    route.name
                )));
            }
        }

        if let Some(default) = &self.default_route {
            if self.route(default).is_none() {
                return Err(Error::Config(format!(
                    "Default route '{}' is not configured",
                    default
                )));
            }
        }

        self.sync.validate()?;
        self.logging.validate()
    }
}

/// A named binding between a vault folder and the two remote stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Unique route name.
    pub name: String,
    /// Free-form description shown by route listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Vault folder holding the Markdown documents of this route.
    pub source_root: PathBuf,
    /// Parent page under which structured-store pages are created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_parent: Option<String>,
    /// Folder in which HTML-store documents are created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_folder: Option<String>,
    /// Disabled routes are kept in the file but refuse to sync.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            source_root: source_root.into(),
            structured_parent: None,
            html_folder: None,
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_structured_parent(mut self, parent: impl Into<String>) -> Self {
        self.structured_parent = Some(parent.into());
        self
    }

    pub fn with_html_folder(mut self, folder: impl Into<String>) -> Self {
        self.html_folder = Some(folder.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("Route name cannot be empty".to_string()));
        }

        if self.name.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "Route name '{}' cannot contain whitespace",
                self.name
            )));
        }

        if self.source_root.as_os_str().is_empty() {
            return Err(Error::Config(format!(
                "Route '{}' has an empty source root",
                self.name
            )));
        }

        Ok(())
    }
}

/// How an existing HTML-store document is updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlUpdateStrategy {
    /// Replace the document content in place.
    #[default]
    Replace,
    /// Create a new document, move backlinks to it, then delete the old one.
    Recreate,
}

/// Settings shared by every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Upper bound on documents synced concurrently by a batch.
    pub max_concurrent_documents: usize,
    /// Conventional media folders searched under the vault root, in order.
    pub media_folders: Vec<String>,
    /// Fall back to a recursive search of the vault for embed references.
    pub recursive_media_search: bool,
    /// Update policy for existing HTML-store documents.
    pub html_update_strategy: HtmlUpdateStrategy,
    /// Folder, relative to a written document, receiving downloaded media.
    pub media_output_folder: String,
    /// Scratch directory for downloaded blobs during reverse sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    /// SQLite file holding sync records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_db_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent_documents: 4,
            media_folders: ["_media", "assets", "images", "attachments", "files"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recursive_media_search: true,
            html_update_strategy: HtmlUpdateStrategy::Replace,
            media_output_folder: "_media".to_string(),
            staging_dir: None,
            state_db_path: None,
        }
    }
}

impl SyncSettings {
    pub fn with_max_concurrent_documents(mut self, max: usize) -> Self {
        self.max_concurrent_documents = max;
        self
    }

    pub fn with_media_folders(mut self, folders: Vec<String>) -> Self {
        self.media_folders = folders;
        self
    }

    pub fn with_recursive_media_search(mut self, enabled: bool) -> Self {
        self.recursive_media_search = enabled;
        self
    }

    pub fn with_html_update_strategy(mut self, strategy: HtmlUpdateStrategy) -> Self {
        self.html_update_strategy = strategy;
        self
    }

    pub fn with_media_output_folder(mut self, folder: impl Into<String>) -> Self {
        self.media_output_folder = folder.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn with_state_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_db_path = Some(path.into());
        self
    }

    /// Staging directory, defaulting to a folder under the system temp dir.
    pub fn staging_dir_or_default(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(CONFIG_DIR_NAME).join("staging"))
    }

    /// State database path, defaulting to the user data directory.
    pub fn state_db_path_or_default(&self) -> Result<PathBuf> {
        if let Some(path) = &self.state_db_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join("sync_state.db"))
            .ok_or_else(|| Error::Config("No data directory on this platform".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_documents == 0 {
            return Err(Error::Config(
                "max_concurrent_documents must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_documents > MAX_CONCURRENT_DOCUMENTS {
            return Err(Error::Config(format!(
                "max_concurrent_documents exceeds maximum of {}",
                MAX_CONCURRENT_DOCUMENTS
            )));
        }

        if self.media_output_folder.trim().is_empty() {
            return Err(Error::Config(
                "media_output_folder cannot be empty".to_string(),
            ));
        }

        if Path::new(&self.media_output_folder).is_absolute() {
            return Err(Error::Config(
                "media_output_folder must be relative to the document".to_string(),
            ));
        }

        if Path::new(&self.media_output_folder)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Config(
                "media_output_folder cannot leave the document directory".to_string(),
            ));
        }

        Ok(())
    }
}
