//! Server configuration management for `agora.toml`.
//!
//! # Sections
//!
//! | Section      | Purpose                                        |
//! |--------------|------------------------------------------------|
//! | `[paths]`    | Project layout (manifest, templates, data)     |
//! | `[serve]`    | HTTP server (port, interface, watch)           |
//! | `[security]` | HTTPS enforcement, security response headers   |
//! | `[fetch]`    | Remote data-source client (timeout)            |
//! | `[extra]`    | User-defined custom fields                     |
//!
//! The site manifest (`site.yaml`) is a separate document handled by the
//! `manifest` module; this file covers only the serving process itself.
//!
//! # Example
//!
//! ```toml
//! [paths]
//! manifest = "site.yaml"
//! data = "data"
//!
//! [serve]
//! port = 8427
//! watch = true
//!
//! [security]
//! force_https = false
//!
//! [fetch]
//! timeout_secs = 10
//! ```

pub mod defaults;
mod fetch;
mod handle;
mod paths;
mod security;
mod serve;

pub use handle::{cfg, init_config};

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::{Result, bail};
use educe::Educe;
use fetch::FetchConfig;
use paths::PathsConfig;
use security::SecurityConfig;
use serde::{Deserialize, Serialize};
use serve::ServeConfig;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing agora.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute project root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Project directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// HTTPS enforcement and response headers
    #[serde(default)]
    pub security: SecurityConfig,

    /// Remote data source settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: HashMap<String, toml::Value>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get CLI arguments reference
    pub fn get_cli(&self) -> &'static Cli {
        self.cli.unwrap()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        let root = cli
            .root
            .as_deref()
            .unwrap_or(Path::new("./"))
            .to_path_buf();
        self.update_path_with_root(&root);

        if let Commands::Serve {
            interface,
            port,
            watch,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path) {
        let cli = self.get_cli();

        let root = Self::normalize_path(root);
        self.config_path = Self::normalize_path(&root.join(&cli.config));

        self.paths.manifest = Self::normalize_path(&root.join(&self.paths.manifest));
        self.paths.templates = Self::normalize_path(&root.join(&self.paths.templates));
        self.paths.snippets = Self::normalize_path(&root.join(&self.paths.snippets));
        self.paths.assets = Self::normalize_path(&root.join(&self.paths.assets));
        self.paths.data = Self::normalize_path(&root.join(&self.paths.data));

        self.root = root;
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        if !self.paths.manifest.exists() {
            bail!(ConfigError::Validation(format!(
                "[paths.manifest] not found: `{}`",
                self.paths.manifest.display()
            )));
        }

        if self.interface()?.is_multicast() {
            bail!(ConfigError::Validation(
                "[serve.interface] must be a unicast address".into()
            ));
        }

        if !self.serve.static_url.starts_with('/') || !self.serve.static_url.ends_with('/') {
            bail!(ConfigError::Validation(
                "[serve.static_url] must start and end with `/`".into()
            ));
        }

        if self.fetch.timeout_secs == 0 {
            bail!(ConfigError::Validation(
                "[fetch.timeout_secs] must be greater than zero".into()
            ));
        }

        Ok(())
    }

    /// Parse the configured bind interface.
    pub fn interface(&self) -> Result<std::net::IpAddr> {
        self.serve
            .interface
            .parse()
            .map_err(|_| {
                ConfigError::Validation(format!(
                    "[serve.interface] is not a valid IP address: `{}`",
                    self.serve.interface
                ))
                .into()
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
