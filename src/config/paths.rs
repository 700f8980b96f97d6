//! `[paths]` section configuration.
//!
//! All paths are declared relative to the project root and normalized
//! to absolute paths after CLI arguments are applied.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[paths]` section in agora.toml - project directory layout.
///
/// # Example
/// ```toml
/// [paths]
/// manifest = "site.yaml"
/// templates = "templates"
/// snippets = "snippets"
/// assets = "assets"
/// data = "data"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Site manifest file (YAML) describing pages and site metadata.
    #[serde(default = "defaults::paths::manifest")]
    #[educe(Default = defaults::paths::manifest())]
    pub manifest: PathBuf,

    /// Directory holding page templates.
    #[serde(default = "defaults::paths::templates")]
    #[educe(Default = defaults::paths::templates())]
    pub templates: PathBuf,

    /// Secondary template directory for reusable snippets.
    #[serde(default = "defaults::paths::snippets")]
    #[educe(Default = defaults::paths::snippets())]
    pub snippets: PathBuf,

    /// Static asset directory, served unchanged under the static URL.
    #[serde(default = "defaults::paths::assets")]
    #[educe(Default = defaults::paths::assets())]
    pub assets: PathBuf,

    /// Root directory for local data sources.
    #[serde(default = "defaults::paths::data")]
    #[educe(Default = defaults::paths::data())]
    pub data: PathBuf,
}
